use crate::error::{PfileError, PfileResult};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum LogFile {
    Error,
    Game,
    Lag,
}

struct Logger {
    files: Mutex<BTreeMap<LogFile, File>>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "pfile - player record store";

const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Opens `<root>/log/*.log` and installs the global subscriber. Events on
/// the `lag` target go to lag.log, warnings and errors to error.log, the
/// rest to game.log.
pub fn init(root: &Path, filter: &str) -> PfileResult<()> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir)
        .map_err(|err| PfileError::io("create directory", &log_dir, err))?;

    let mut files = BTreeMap::new();
    for (log_file, name, header) in [
        (LogFile::Error, "error.log", false),
        (LogFile::Game, "game.log", true),
        (LogFile::Lag, "lag.log", false),
    ] {
        let path = log_dir.join(name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| PfileError::io("open log", &path, err))?;
        if header && file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            write_header(&mut file, name).map_err(|err| PfileError::io("write", &path, err))?;
        }
        files.insert(log_file, file);
    }

    // A concurrent init may have won the race; its files serve just as well.
    let _ = LOGGER.set(Logger {
        files: Mutex::new(files),
    });

    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(LogRouter)
        .try_init();
    Ok(())
}

pub fn log_game(message: &str) {
    log_timestamped(LogFile::Game, message);
}

pub fn log_error(message: &str) {
    log_timestamped(LogFile::Error, message);
}

fn log_timestamped(log_file: LogFile, message: &str) {
    if let Some(logger) = LOGGER.get() {
        let timestamp = format_timestamp(unix_timestamp());
        let line = format!("{timestamp} (0): {message}\n");
        let _ = write_line(logger, log_file, line.as_bytes());
    }
}

fn write_line(logger: &Logger, log_file: LogFile, line: &[u8]) -> io::Result<()> {
    let mut files = logger
        .files
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "log lock poisoned"))?;
    if let Some(file) = files.get_mut(&log_file) {
        file.write_all(line)?;
        file.flush()?;
    }
    Ok(())
}

fn route(target: &str, level: Level) -> LogFile {
    if target == "lag" {
        LogFile::Lag
    } else if level <= Level::WARN {
        LogFile::Error
    } else {
        LogFile::Game
    }
}

/// Hands the fmt layer one buffered writer per event, bound to the file the
/// event routes to.
#[derive(Clone, Copy, Debug)]
struct LogRouter;

struct RoutedEvent {
    file: LogFile,
    buffer: Vec<u8>,
}

impl Write for RoutedEvent {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RoutedEvent {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if let Some(logger) = LOGGER.get() {
            let _ = write_line(logger, self.file, &self.buffer);
        }
    }
}

impl<'a> MakeWriter<'a> for LogRouter {
    type Writer = RoutedEvent;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedEvent {
            file: LogFile::Game,
            buffer: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, metadata: &Metadata<'_>) -> Self::Writer {
        RoutedEvent {
            file: route(metadata.target(), *metadata.level()),
            buffer: Vec::new(),
        }
    }
}

fn write_header(file: &mut File, name: &str) -> io::Result<()> {
    let timestamp = format_date(unix_timestamp());
    writeln!(file, "{HEADER_LINE}")?;
    writeln!(file, "{HEADER_TITLE}")?;
    writeln!(file, "{name} - started {timestamp}")?;
    Ok(())
}

/// `Wed Jan  7 14:03:00 2026` style date for log lines about stored times.
pub fn format_date(ts: i64) -> String {
    let datetime = breakdown_timestamp(ts);
    let weekday = WEEKDAYS[(datetime.weekday as usize).min(6)];
    let month = MONTHS[(datetime.month as usize).saturating_sub(1).min(11)];
    format!(
        "{weekday} {month} {:>2} {:02}:{:02}:{:02} {}",
        datetime.day, datetime.hour, datetime.minute, datetime.second, datetime.year
    )
}

fn format_timestamp(ts: i64) -> String {
    let datetime = breakdown_timestamp(ts);
    format!(
        "{:02}.{:02}.{} {:02}:{:02}:{:02}",
        datetime.day, datetime.month, datetime.year, datetime.hour, datetime.minute, datetime.second
    )
}

pub fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct DateTimeParts {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    weekday: u32,
}

fn breakdown_timestamp(ts: i64) -> DateTimeParts {
    let secs = ts.max(0);
    let days = secs / 86_400;
    let seconds_of_day = (secs % 86_400) as u32;
    let (year, month, day) = civil_from_days(days);
    DateTimeParts {
        year,
        month,
        day,
        hour: seconds_of_day / 3_600,
        minute: (seconds_of_day % 3_600) / 60,
        second: seconds_of_day % 60,
        weekday: (days % 7) as u32,
    }
}

fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = mp + if mp < 10 { 3 } else { -9 };
    let year = (y + if m <= 2 { 1 } else { 0 }) as i32;
    (year, m as u32, d as u32)
}
