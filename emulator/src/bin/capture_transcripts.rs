use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

/// Commands replayed against every simulated family.
const SCRIPT: &[&str] = &[
    "help",
    "status",
    "cycle",
    "wait 12000",
    "status",
    "signal",
    "wait 15000",
    "signal",
    "connect hologram",
    "wait 5000",
    "time",
    "sleep",
    "disconnect",
    "sleep",
    "wait 8000",
    "sleep",
    "status",
];

fn main() -> io::Result<()> {
    for profile in TranscriptProfile::all() {
        record_profile(profile)?;
        println!("wrote {}", profile.log_path());
    }
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    for command in SCRIPT {
        let _ = session.handle_command(command)?;
    }
    Ok(())
}
