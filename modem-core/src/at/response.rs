//! `winnow` parsers for the 3GPP TS 27.007 responses the session understands.
//!
//! Each parser takes the text after the `+XXXX:` prefix of one information
//! line. [`find_info`] locates that line inside a full response.

use winnow::ModalResult;
use winnow::ascii::{dec_uint, space0};
use winnow::combinator::{preceded, separated_pair, terminated};
use winnow::prelude::*;

use crate::capability::{BatteryState, RegistrationStatus};

/// Returns the payload of the first line starting with `prefix` (for example
/// `"+CSQ:"`), trimmed of surrounding whitespace.
pub fn find_info<'a>(response: &'a str, prefix: &str) -> Option<&'a str> {
    response
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
}

/// Iterates over the payloads of every line starting with `prefix`.
pub fn info_lines<'a>(response: &'a str, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    response
        .lines()
        .map(str::trim)
        .filter_map(move |line| line.strip_prefix(prefix))
        .map(str::trim)
}

/// Returns `true` when the response ends in a final `OK`.
pub fn is_ok(response: &str) -> bool {
    response
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .is_some_and(|line| line == "OK")
}

/// Returns `true` for lines that terminate an AT transaction.
pub fn is_final_result(line: &str) -> bool {
    let line = line.trim();
    line == "OK"
        || line == "ERROR"
        || line.starts_with("+CME ERROR")
        || line.starts_with("+CMS ERROR")
        || line == "NO CARRIER"
}

/// First informational text line of a response, skipping the command echo.
pub fn first_text_line<'a>(response: &'a str, command: &str) -> Option<&'a str> {
    response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != command && !is_final_result(line))
}

fn comma(input: &mut &str) -> ModalResult<()> {
    (space0, ',', space0).void().parse_next(input)
}

/// `+CSQ: <rssi>,<ber>`
pub fn csq(input: &mut &str) -> ModalResult<(u8, u8)> {
    separated_pair(dec_uint, comma, dec_uint).parse_next(input)
}

/// `+CREG: <n>,<stat>[,...]` or `+CEREG: <n>,<stat>[,...]`.
pub fn registration(input: &mut &str) -> ModalResult<Option<RegistrationStatus>> {
    let stat: u8 = preceded(terminated(dec_uint::<_, u8, _>, comma), dec_uint).parse_next(input)?;
    Ok(RegistrationStatus::from_stat(stat))
}

/// `+CBC: <bcs>,<bcl>,<voltage>` with voltage in millivolts.
pub fn battery(input: &mut &str) -> ModalResult<BatteryState> {
    let (charge_state, _, percent, _, millivolts) =
        (dec_uint, comma, dec_uint, comma, dec_uint).parse_next(input)?;
    Ok(BatteryState {
        charge_state,
        percent,
        millivolts,
    })
}

/// `+CGACT: <cid>,<state>`
pub fn context_state(input: &mut &str) -> ModalResult<(u8, bool)> {
    let (cid, state): (u8, u8) = separated_pair(dec_uint, comma, dec_uint).parse_next(input)?;
    Ok((cid, state == 1))
}

/// Runs `parser` against the payload of the line starting with `prefix`.
pub fn parse_info<'a, O>(
    response: &'a str,
    prefix: &str,
    mut parser: impl FnMut(&mut &'a str) -> ModalResult<O>,
) -> Option<O> {
    let mut payload = find_info(response, prefix)?;
    parser(&mut payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSQ_RESPONSE: &str = "AT+CSQ\r\n+CSQ: 17,99\r\n\r\nOK\r\n";

    #[test]
    fn parses_signal_quality_line() {
        assert_eq!(parse_info(CSQ_RESPONSE, "+CSQ:", csq), Some((17, 99)));
        assert!(is_ok(CSQ_RESPONSE));
    }

    #[test]
    fn parses_registration_with_location_fields() {
        let response = "\r\n+CEREG: 2,5,\"1A2B\",\"01C3D4E5\",7\r\n\r\nOK\r\n";
        assert_eq!(
            parse_info(response, "+CEREG:", registration),
            Some(Some(RegistrationStatus::Registered { roaming: true }))
        );
    }

    #[test]
    fn parses_battery_report() {
        let response = "+CBC: 0,82,4012\r\nOK";
        assert_eq!(
            parse_info(response, "+CBC:", battery),
            Some(BatteryState {
                charge_state: 0,
                percent: 82,
                millivolts: 4_012
            })
        );
    }

    #[test]
    fn context_lines_are_iterated() {
        let response = "+CGACT: 1,0\r\n+CGACT: 2,1\r\nOK";
        let active = info_lines(response, "+CGACT:")
            .filter_map(|mut line| context_state(&mut line).ok())
            .any(|(_, active)| active);
        assert!(active);
    }

    #[test]
    fn error_is_not_ok() {
        assert!(!is_ok("AT+CGACT=1,1\r\n+CME ERROR: 30\r\n"));
        assert!(is_final_result("+CME ERROR: 30"));
    }

    #[test]
    fn first_text_line_skips_echo() {
        let response = "AT+CGMM\r\nSIMCOM_SIM7000G\r\n\r\nOK\r\n";
        assert_eq!(first_text_line(response, "AT+CGMM"), Some("SIMCOM_SIM7000G"));
    }
}
