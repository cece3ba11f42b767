use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

mod wav;

/// Drives a BTX V.23 session against a TCP peer, using WAV files to stand in
/// for the telephony bridge that would normally supply 12 kHz PCM audio.
#[derive(Parser)]
struct Args {
    /// Peer address as "a.b.c.d port", e.g. "127.0.0.1 8080"
    peer: String,
    /// WAV file carrying the terminal's upstream audio (12 kHz mono PCM16)
    input: PathBuf,
    /// WAV file to write the modem's downstream audio to
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::builder()
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();

    let args = Args::parse();

    let config = match btx_session::SessionConfig::parse(&args.peer) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let source = match wav::WavSource::open(&args.input) {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to open {}: {e}", args.input.display());
            return ExitCode::FAILURE;
        }
    };
    let sink = match wav::WavSink::create(&args.output) {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to create {}: {e}", args.output.display());
            return ExitCode::FAILURE;
        }
    };

    let mut session = match btx_session::Session::connect(config, source, sink) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match session.run() {
        Ok(()) => {
            log::info!("session ended");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
