//! Print the main headers and the first body part of one message file.

use std::ffi::OsString;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use chrono::Local;
use log::{error, info};
use structopt::clap::ErrorKind;
use structopt::StructOpt;

use mimelite::MimeMessage;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
/// Dump the headers and first body part of an RFC 5322 message.
struct MsgDump {
    /// Log more about what the parser skipped. May be repeated.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    /// The message file to read.
    #[structopt(parse(from_os_str))]
    msg_file: PathBuf,
}

fn main() {
    let cmd = match parse_args(std::env::args_os()) {
        Ok(cmd) => cmd,
        Err(status) => process::exit(status),
    };

    init_log(cmd.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    process::exit(run(&cmd.msg_file, &mut out));
}

/// Parse the command line, or give the status to exit with.
fn parse_args<I>(args: I) -> Result<MsgDump, i32>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    match MsgDump::from_iter_safe(args) {
        Ok(cmd) => Ok(cmd),
        Err(e) if e.kind == ErrorKind::HelpDisplayed || e.kind == ErrorKind::VersionDisplayed => {
            println!("{}", e.message);
            Err(0)
        }
        Err(e) => {
            eprintln!("{}", e.message);
            Err(1)
        }
    }
}

/// Dump the message at `path` to `out`, returning the exit status.
fn run<W: Write>(path: &Path, out: &mut W) -> i32 {
    match dump(path, out) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}: {}", path.display(), e);
            1
        }
    }
}

fn init_log(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply();
    if let Err(e) = result {
        eprintln!("Failed to set up logging: {}", e);
    }
}

fn or_none<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "<none>".to_string(), |v| v.to_string())
}

fn non_empty<T: Display>(value: T, is_empty: bool) -> Option<T> {
    if is_empty {
        None
    } else {
        Some(value)
    }
}

fn dump<W: Write>(path: &Path, out: &mut W) -> Result<(), mimelite::Error> {
    let message = MimeMessage::open(path)?;
    for defect in message.defects() {
        info!("{}: {}", path.display(), defect);
    }

    write_headers(&message, out)?;
    if let Some(chunks) = message.first_body_part_chunks() {
        for chunk in chunks {
            out.write_all(&chunk)?;
        }
    }
    out.flush()?;

    Ok(())
}

fn write_headers<W: Write>(message: &MimeMessage, out: &mut W) -> io::Result<()> {
    let from = message.from();
    let to = message.to();
    let cc = message.cc();
    let bcc = message.bcc();
    writeln!(out, "From   : {}", or_none(non_empty(&from, from.is_empty())))?;
    writeln!(out, "To     : {}", or_none(non_empty(&to, to.is_empty())))?;
    writeln!(out, "Cc     : {}", or_none(non_empty(&cc, cc.is_empty())))?;
    writeln!(out, "Bcc    : {}", or_none(non_empty(&bcc, bcc.is_empty())))?;
    writeln!(out, "Subject: {}", or_none(message.subject()))?;

    match message.date() {
        Some(date) => {
            let local = date.with_timezone(&Local);
            writeln!(out, "Date   : {} ({})", local.format("%c"), local.format("%z"))?;
        }
        None => writeln!(out, "Date   : <none>")?,
    }

    writeln!(out, "Msg-id : {}", or_none(message.message_id()))?;
    let refs = message.references();
    writeln!(out, "Refs   : {}", or_none(non_empty(&refs, refs.is_empty())))
}
