mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use crossterm::style::Stylize;
use session::{Session, TranscriptProfile};

const USAGE: &str = "Usage: modem-emulator [--module <name>] [--list] | modem-emulator <name>";

/// What the command line asked for.
enum Invocation {
    Run(TranscriptProfile),
    List,
}

fn main() -> io::Result<()> {
    let invocation = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let profile = match invocation {
        Invocation::List => {
            for profile in TranscriptProfile::all() {
                println!("{}", profile.name());
            }
            return Ok(());
        }
        Invocation::Run(profile) => profile,
    };

    let mut session = Session::new(profile)?;
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    writeln!(
        writer,
        "Emulating a {} modem on a virtual clock. `help` lists commands, `wait <ms>` advances time, `exit` quits.",
        profile.name()
    )?;

    let mut line = String::new();
    loop {
        write!(
            writer,
            "[{} +{}ms]> ",
            session.modem().state(),
            session.elapsed().as_millis()
        )?;
        writer.flush()?;

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            writeln!(writer)?;
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        for reply in session.handle_command(input)? {
            print_reply(&mut writer, &reply)?;
        }
    }

    writeln!(writer, "Transcript written to {}.", profile.log_path())
}

fn print_reply(writer: &mut impl Write, reply: &str) -> io::Result<()> {
    if reply.starts_with("OK") {
        writeln!(writer, "{}", reply.green())
    } else if reply.starts_with("WARN") {
        writeln!(writer, "{}", reply.yellow())
    } else if reply.starts_with("ERR") {
        writeln!(writer, "{}", reply.red())
    } else if reply.starts_with("  [") {
        writeln!(writer, "{}", reply.dark_grey())
    } else {
        writeln!(writer, "{reply}")
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Invocation, String> {
    let Some(arg) = args.next() else {
        return TranscriptProfile::from_tag("sim7000").map(Invocation::Run);
    };

    let tag = match arg.as_str() {
        "--list" => return Ok(Invocation::List),
        "--module" => args
            .next()
            .ok_or_else(|| "Expected a module name after --module".to_string())?,
        other => other.strip_prefix("--module=").unwrap_or(other).to_string(),
    };
    if let Some(extra) = args.next() {
        return Err(format!("Unexpected argument `{extra}`"));
    }
    TranscriptProfile::from_tag(&tag).map(Invocation::Run)
}
