//! Daylog CLI - Command-line interface for the Daylog journal
//!
//! Commands:
//! - add: Enter values for every day missing from the store
//! - edit / reorder / migrate: Change the store
//! - show: Print records
//! - intervals, percentiles, average, correlate, periods, moon, align: Analyses (JSON output)
//! - doctor: Diagnose configuration and store health
//! - schema: Print the configured fields

use chrono::{Datelike, Local, NaiveDate, Weekday};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use daylog::alignment::{align_observations, parse_observations_ndjson, parse_scrobbles_csv};
use daylog::events::{
    average_across_periods, current_streak, event_dates, extract_periods, IntervalHistogram,
};
use daylog::factors::{FactorMatrix, LIST_SEPARATOR};
use daylog::index::{index_range, index_range_between, IndexRange};
use daylog::migrate::Migration;
use daylog::moon::phase_histogram;
use daylog::schema::{FieldSpec, Schema, SCALE_MAX};
use daylog::series::{is_scaled_true, keyword_presence, read_field};
use daylog::stats::{lagged_correlate, sliding_percentiles_between, DEFAULT_PERCENTILES};
use daylog::store::{Answer, Store, ValueSource, ViolationKind};
use daylog::types::{AppendOutcome, Record, RecordPatch, Series};
use daylog::{FieldError, JournalConfig, JournalError, JournalResult, DAYLOG_VERSION};

/// Daylog - personal longitudinal journal
#[derive(Parser)]
#[command(name = "daylog")]
#[command(version = DAYLOG_VERSION)]
#[command(about = "Record daily self-reports and analyse them", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "DAYLOG_CONFIG", default_value = "daylog.toml")]
    config: PathBuf,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enter values for the days missing since the last record
    Add,

    /// Change fields of one record
    Edit {
        /// Date of the record (YYYY-MM-DD)
        date: NaiveDate,

        /// Set a field (repeatable)
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        set: Vec<String>,

        /// Remove a field (repeatable)
        #[arg(long = "unset", value_name = "FIELD")]
        unset: Vec<String>,

        /// Read a JSON patch `{"set": {...}, "remove": [...]}` (use - for stdin)
        #[arg(long)]
        patch: Option<PathBuf>,
    },

    /// Rewrite every record with fields in schema order
    Reorder,

    /// Print records: the last N days, or FIRST [LAST] dates
    Show {
        #[arg(num_args = 0..=2)]
        range: Vec<String>,
    },

    /// Intervals between events, their histogram and the current streak
    Intervals {
        #[command(flatten)]
        series: SeriesArgs,
    },

    /// Sliding-window percentiles of the intervals between events
    Percentiles {
        #[command(flatten)]
        series: SeriesArgs,

        /// Window size in days
        #[arg(long, default_value = "365")]
        window: u32,

        /// Percentiles to compute
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_PERCENTILES.to_vec())]
        percentiles: Vec<f64>,
    },

    /// Calendar moving average of a field
    Average {
        #[command(flatten)]
        series: SeriesArgs,

        /// Window size in days
        #[arg(long, default_value = "7")]
        window: u32,

        /// Rescale the field's declared range onto 0-10 first
        #[arg(long)]
        scale: bool,
    },

    /// Lagged correlation of daily factors against a value field
    Correlate {
        /// Keywords searched in the text field
        #[arg(long, value_delimiter = ',', conflicts_with = "list_field")]
        keywords: Vec<String>,

        /// Comma-separated list field whose items are factors
        #[arg(long)]
        list_field: Option<String>,

        /// Text field searched for keywords
        #[arg(long, default_value = "text")]
        text_field: String,

        /// Field correlated against
        #[arg(long)]
        values: String,

        /// Number of lags, starting at 0 days
        #[arg(long, default_value = "5")]
        lags: u32,

        /// Ignore list items seen on fewer days
        #[arg(long, default_value = "1")]
        min_count: usize,

        #[command(flatten)]
        dates: DateArgs,
    },

    /// Average a field over the periods between marker events
    Periods {
        /// Boolean marker field
        marker: String,

        /// Field averaged over each period
        value: String,

        /// Points on the normalized period axis
        #[arg(long, default_value = "20")]
        points: usize,

        #[command(flatten)]
        dates: DateArgs,
    },

    /// Moon illumination on marker event dates
    Moon {
        /// Boolean marker field
        marker: String,

        /// Histogram bins
        #[arg(long, default_value = "12")]
        bins: usize,

        #[command(flatten)]
        dates: DateArgs,
    },

    /// Labelled observations aligned around marker events
    Align {
        /// Boolean marker field
        marker: String,

        /// Observations file, `-` for stdin
        #[arg(long)]
        observations: PathBuf,

        /// Observations file format
        #[arg(long, default_value = "csv")]
        format: ObservationFormat,

        /// Labels reported
        #[arg(long, default_value = "20")]
        top: usize,

        /// Days either side of each event
        #[arg(long, default_value = "10")]
        side: u32,
    },

    /// Convert a legacy store in place
    Migrate {
        /// Legacy file (defaults to the configured store)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Report without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Diagnose configuration and store health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the configured fields
    Schema {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum ObservationFormat {
    /// Scrobbles export with `utc_time` and `artist` columns
    Csv,
    /// Newline-delimited JSON with `date` and `label` (or `artist`)
    Ndjson,
}

#[derive(Args)]
struct DateArgs {
    /// First date analysed
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last date analysed
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Args)]
struct SeriesArgs {
    /// Numeric or boolean field, or a text field with --keyword
    field: String,

    /// Use presence of this keyword in the text field
    #[arg(long)]
    keyword: Option<String>,

    #[command(flatten)]
    dates: DateArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Loaded configuration and schema
struct Journal {
    config: JournalConfig,
    schema: Schema,
}

impl Journal {
    fn open(path: &Path) -> Result<Self, DaylogCliError> {
        let config = JournalConfig::load(path)?;
        let schema = config.schema()?;
        Ok(Self { config, schema })
    }

    fn load_store(&self) -> Result<Store, DaylogCliError> {
        Ok(Store::load(&self.config.store_path)?)
    }

    fn save_store(&self, store: &Store) -> Result<(), DaylogCliError> {
        Ok(store.save(&self.config.store_path)?)
    }

    fn field(&self, name: &str) -> Result<&FieldSpec, DaylogCliError> {
        Ok(self.schema.resolve(name)?)
    }
}

fn run(cli: Cli) -> Result<(), DaylogCliError> {
    if let Commands::Doctor { json } = cli.command {
        return cmd_doctor(&cli.config, json);
    }
    let journal = Journal::open(&cli.config)?;

    match cli.command {
        Commands::Add => cmd_add(&journal),
        Commands::Edit {
            date,
            set,
            unset,
            patch,
        } => cmd_edit(&journal, date, &set, &unset, patch.as_deref()),
        Commands::Reorder => cmd_reorder(&journal),
        Commands::Show { range } => cmd_show(&journal, &range),
        Commands::Intervals { series } => cmd_intervals(&journal, &series),
        Commands::Percentiles {
            series,
            window,
            percentiles,
        } => cmd_percentiles(&journal, &series, window, &percentiles),
        Commands::Average {
            series,
            window,
            scale,
        } => cmd_average(&journal, &series, window, scale),
        Commands::Correlate {
            keywords,
            list_field,
            text_field,
            values,
            lags,
            min_count,
            dates,
        } => cmd_correlate(
            &journal,
            &keywords,
            list_field.as_deref(),
            &text_field,
            &values,
            lags,
            min_count,
            &dates,
        ),
        Commands::Periods {
            marker,
            value,
            points,
            dates,
        } => cmd_periods(&journal, &marker, &value, points, &dates),
        Commands::Moon {
            marker,
            bins,
            dates,
        } => cmd_moon(&journal, &marker, bins, &dates),
        Commands::Align {
            marker,
            observations,
            format,
            top,
            side,
        } => cmd_align(&journal, &marker, &observations, format, top, side),
        Commands::Migrate { input, dry_run } => cmd_migrate(&journal, input.as_deref(), dry_run),
        Commands::Schema { json } => cmd_schema(&journal, json),
        Commands::Doctor { .. } => Ok(()),
    }
}

fn cmd_add(journal: &Journal) -> Result<(), DaylogCliError> {
    let mut store = journal.load_store()?;
    let upper = journal.config.upper_bound(Local::now().naive_local());
    let mut source = StdinSource::new(journal.schema.explicit_fields().any(|f| f.is_numeric()));

    println!();
    match store.append_missing_days(&journal.schema, upper, &mut source)? {
        AppendOutcome::UpToDate => println!("Already up to date"),
        AppendOutcome::Appended(dates) => {
            journal.save_store(&store)?;
            println!("\nSaved {} day(s)", dates.len());
        }
    }
    println!();
    Ok(())
}

fn cmd_edit(
    journal: &Journal,
    date: NaiveDate,
    set: &[String],
    unset: &[String],
    patch_file: Option<&Path>,
) -> Result<(), DaylogCliError> {
    let mut patch = match patch_file {
        Some(path) => serde_json::from_str::<RecordPatch>(&read_input(path)?)?,
        None => RecordPatch::new(),
    };
    for assignment in set {
        let (field, raw) = assignment.split_once('=').ok_or_else(|| {
            DaylogCliError::InvalidArgument(format!("expected FIELD=VALUE, got {:?}", assignment))
        })?;
        let spec = journal.field(field)?;
        let value = spec
            .parse_input(raw)
            .map_err(|source| JournalError::InvalidValue {
                field: field.to_string(),
                source,
            })?;
        patch.set.insert(field.to_string(), value);
    }
    patch.remove.extend(unset.iter().cloned());
    if patch.is_empty() {
        return Err(DaylogCliError::InvalidArgument(
            "nothing to change; use --set, --unset or --patch".to_string(),
        ));
    }

    let mut store = journal.load_store()?;
    let mut editor = |_: &Record| -> JournalResult<RecordPatch> { Ok(patch.clone()) };
    let edited = store.edit_with(&journal.schema, date, &mut editor)?;
    println!("{}", render_record(&journal.schema, edited));
    journal.save_store(&store)?;
    Ok(())
}

fn cmd_reorder(journal: &Journal) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let reordered = store.reorder(&journal.schema);
    journal.save_store(&reordered)?;
    println!("Reordered {} records", reordered.len());
    Ok(())
}

fn cmd_show(journal: &Journal, range: &[String]) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    if store.is_empty() {
        println!("No records yet");
        return Ok(());
    }
    let indices = match range {
        [] => index_range(&store, 7, None)?,
        [single] => match single.parse::<u32>() {
            Ok(days) => index_range(&store, days, None)?,
            Err(_) => index_range_between(&store, parse_date(single)?, None)?,
        },
        [first, last, ..] => {
            index_range_between(&store, parse_date(first)?, Some(parse_date(last)?))?
        }
    };

    println!();
    for record in &store.records()[indices.first..=indices.last] {
        println!("{}\n", render_record(&journal.schema, record));
    }
    Ok(())
}

fn cmd_intervals(journal: &Journal, args: &SeriesArgs) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let intervals = event_series(journal, &store, args)?.intervals(is_scaled_true);
    let histogram = IntervalHistogram::from_intervals(&intervals);
    let field = journal.field(&args.field)?;
    let streak = match &args.keyword {
        None if field.is_boolean() => current_streak(&store, field)?,
        _ => None,
    };

    #[derive(Serialize)]
    struct IntervalsReport {
        intervals: Series,
        histogram: IntervalHistogram,
        current: Option<daylog::events::StreakRank>,
    }
    print_json(&IntervalsReport {
        intervals,
        histogram,
        current: streak,
    })
}

fn cmd_percentiles(
    journal: &Journal,
    args: &SeriesArgs,
    window: u32,
    percentiles: &[f64],
) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let range = select_range(&store, &args.dates)?;
    let records = store.records();
    let intervals = event_series(journal, &store, args)?.intervals(is_scaled_true);
    print_json(&sliding_percentiles_between(
        &intervals,
        records[range.first].date,
        records[range.last].date,
        window,
        percentiles,
    )?)
}

fn cmd_average(
    journal: &Journal,
    args: &SeriesArgs,
    window: u32,
    scale: bool,
) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let mut series = event_series(journal, &store, args)?;
    if scale && args.keyword.is_none() {
        if let Some(range) = journal.field(&args.field)?.range {
            series = series.normalize_to_scale(range.min, range.max)?;
        }
    }
    print_json(&series.moving_average(window)?)
}

#[allow(clippy::too_many_arguments)]
fn cmd_correlate(
    journal: &Journal,
    keywords: &[String],
    list_field: Option<&str>,
    text_field: &str,
    values: &str,
    lags: u32,
    min_count: usize,
    dates: &DateArgs,
) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let range = select_range(&store, dates)?;
    let factors = match list_field {
        Some(field) => FactorMatrix::from_list_field(
            &store,
            journal.field(field)?,
            LIST_SEPARATOR,
            range,
            min_count,
        )?,
        None if !keywords.is_empty() => {
            FactorMatrix::from_keywords(&store, journal.field(text_field)?, keywords, range)?
        }
        None => {
            return Err(DaylogCliError::InvalidArgument(
                "give --keywords or --list-field".to_string(),
            ))
        }
    };
    print_json(&lagged_correlate(
        &store,
        &factors,
        journal.field(values)?,
        lags,
    )?)
}

fn cmd_periods(
    journal: &Journal,
    marker: &str,
    value: &str,
    points: usize,
    dates: &DateArgs,
) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let range = select_range(&store, dates)?;
    let periods = extract_periods(
        &store,
        journal.field(marker)?,
        range,
        journal.field(value)?,
    )?;
    print_json(&average_across_periods(&periods, points)?)
}

fn cmd_moon(
    journal: &Journal,
    marker: &str,
    bins: usize,
    dates: &DateArgs,
) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let range = select_range(&store, dates)?;
    let events = event_dates(&store, journal.field(marker)?, range)?;
    print_json(&phase_histogram(&events, bins)?)
}

fn cmd_align(
    journal: &Journal,
    marker: &str,
    observations: &Path,
    format: ObservationFormat,
    top: usize,
    side: u32,
) -> Result<(), DaylogCliError> {
    let store = journal.load_store()?;
    let events = event_dates(&store, journal.field(marker)?, IndexRange::all(&store)?)?;
    let input = read_input(observations)?;
    let observations = match format {
        ObservationFormat::Csv => parse_scrobbles_csv(input.as_bytes())?,
        ObservationFormat::Ndjson => parse_observations_ndjson(&input)?,
    };
    print_json(&align_observations(&events, &observations, top, side))
}

fn cmd_migrate(journal: &Journal, input: Option<&Path>, dry_run: bool) -> Result<(), DaylogCliError> {
    let source = input.unwrap_or(journal.config.store_path.as_path());
    let mut document = Store::load_value(source)?.ok_or_else(|| {
        DaylogCliError::InvalidArgument(format!("{} does not exist", source.display()))
    })?;
    let migration = journal
        .config
        .migration
        .clone()
        .unwrap_or_else(Migration::legacy);
    let report = migration.apply(&mut document)?;
    let store = Store::from_json_value(document)?.reorder(&journal.schema);

    if !dry_run {
        journal.save_store(&store)?;
    }
    print_json(&report)
}

fn cmd_doctor(config_path: &Path, json: bool) -> Result<(), DaylogCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "daylog_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Daylog version {}", DAYLOG_VERSION),
    });

    match Journal::open(config_path) {
        Ok(journal) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} ({} fields, {} active)",
                    config_path.display(),
                    journal.schema.fields().len(),
                    journal.schema.active_fields().count()
                ),
            });
            checks.push(store_check(&journal));
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive entry ready)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is not a TTY; 'add' will read answers from the pipe".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: DAYLOG_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Daylog Doctor Report");
        println!("====================");
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DaylogCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn store_check(journal: &Journal) -> DoctorCheck {
    let path = &journal.config.store_path;
    let store = match Store::load(path) {
        Ok(store) => store,
        Err(e) => {
            return DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }
        }
    };
    if store.is_empty() {
        return DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} has no records yet", path.display()),
        };
    }

    let violations = store.validate(&journal.schema);
    let invalid = violations
        .iter()
        .filter(|v| !matches!(v.kind, ViolationKind::Unknown))
        .count();
    let unknown = violations.len() - invalid;
    let span = match (store.first_date(), store.last_date()) {
        (Some(first), Some(last)) => format!("{} to {}", first, last),
        _ => String::new(),
    };
    let message = format!(
        "{} records, {}; {} invalid values, {} unknown keys",
        store.len(),
        span,
        invalid,
        unknown
    );
    for violation in violations.iter().filter(|v| !matches!(v.kind, ViolationKind::Unknown)) {
        tracing::warn!(date = %violation.date, field = %violation.field, kind = ?violation.kind, "invalid stored value");
    }
    DoctorCheck {
        name: "store".to_string(),
        status: if invalid > 0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Ok
        },
        message,
    }
}

fn cmd_schema(journal: &Journal, json: bool) -> Result<(), DaylogCliError> {
    if json {
        return print_json(&journal.schema.fields());
    }
    println!("Store: {}", journal.config.store_path.display());
    println!("Day cutoff: {}:00", journal.config.day_cutoff_hour);
    println!();
    for field in journal.schema.fields() {
        let mut line = format!("  {:<12} {:<8}", field.name, field.kind.as_str());
        if let Some(range) = field.range {
            line.push_str(&format!(" [{}, {}]", range.min, range.max));
        }
        if let Some(rule) = &field.derive {
            line.push_str(&format!(" = {:?} in {}", rule.keyword, rule.source));
        }
        if !field.active {
            line.push_str(" (historical)");
        }
        println!("{}", line);
    }
    Ok(())
}

// Helper functions

/// Field series, or keyword presence when `--keyword` is given
fn event_series(
    journal: &Journal,
    store: &Store,
    args: &SeriesArgs,
) -> Result<Series, DaylogCliError> {
    let range = select_range(store, &args.dates)?;
    let field = journal.field(&args.field)?;
    Ok(match &args.keyword {
        Some(keyword) => keyword_presence(store, field, keyword, range)?,
        None => read_field(store, field, range)?,
    })
}

fn select_range(store: &Store, dates: &DateArgs) -> Result<IndexRange, DaylogCliError> {
    Ok(match dates.from {
        Some(first) => index_range_between(store, first, dates.to)?,
        None => match (dates.to, store.first_date()) {
            (Some(last), Some(first)) => index_range_between(store, first, Some(last))?,
            _ => IndexRange::all(store)?,
        },
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, DaylogCliError> {
    raw.parse::<NaiveDate>().map_err(|e| {
        DaylogCliError::InvalidArgument(format!("expected a day count or YYYY-MM-DD, got {:?}: {}", raw, e))
    })
}

fn read_input(path: &Path) -> Result<String, DaylogCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), DaylogCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Plain-text record: weekday and date, then fields in schema order with
/// text values on their own line
fn render_record(schema: &Schema, record: &Record) -> String {
    let mut line = format!("{:<10}{}  ", weekday_name(record.date.weekday()), record.date);
    for spec in schema.fields() {
        if let Some(value) = record.get(&spec.name) {
            if matches!(value, Value::String(_)) {
                line.push('\n');
            }
            line.push_str(&format!("{}: {} ", spec.name, spec.kind.format(value)));
        }
    }
    line
}

/// Interactive answers from stdin; an empty line skips the field
struct StdinSource {
    lines: io::Lines<io::StdinLock<'static>>,
    current: Option<NaiveDate>,
    show_scale: bool,
}

impl StdinSource {
    fn new(show_scale: bool) -> Self {
        Self {
            lines: io::stdin().lock().lines(),
            current: None,
            show_scale,
        }
    }
}

impl ValueSource for StdinSource {
    fn ask(
        &mut self,
        date: NaiveDate,
        field: &FieldSpec,
        rejected: Option<&FieldError>,
    ) -> JournalResult<Answer> {
        if self.current != Some(date) {
            self.current = Some(date);
            println!("Data for {} {}\n", weekday_name(date.weekday()), date);
            if self.show_scale {
                let ticks = SCALE_MAX as usize;
                println!("            |{}", "---|".repeat(ticks));
                let labels: Vec<String> = (0..=ticks).map(|i| format!("{:<3}", i)).collect();
                println!("            {}\n", labels.join(" ").trim_end());
            }
        }
        if let Some(e) = rejected {
            println!("  {}", e);
        }

        let hint = if field.is_boolean() { " (y/n)" } else { "" };
        print!("{}{}: ", field.name, hint);
        io::stdout().flush()?;

        match self.lines.next() {
            None => Err(JournalError::Input(format!(
                "input ended while asking {} for {}",
                field.name, date
            ))),
            Some(line) => {
                let line = line?;
                if line.trim().is_empty() {
                    Ok(Answer::Skip)
                } else {
                    Ok(Answer::Raw(line.trim().to_string()))
                }
            }
        }
    }
}

// Error types

#[derive(Debug)]
enum DaylogCliError {
    Journal(JournalError),
    Io(io::Error),
    Json(serde_json::Error),
    InvalidArgument(String),
    DoctorFailed,
}

impl From<JournalError> for DaylogCliError {
    fn from(e: JournalError) -> Self {
        DaylogCliError::Journal(e)
    }
}

impl From<io::Error> for DaylogCliError {
    fn from(e: io::Error) -> Self {
        DaylogCliError::Io(e)
    }
}

impl From<serde_json::Error> for DaylogCliError {
    fn from(e: serde_json::Error) -> Self {
        DaylogCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: Option<&str>) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: hint.map(str::to_string),
        }
    }
}

impl From<DaylogCliError> for CliError {
    fn from(e: DaylogCliError) -> Self {
        match e {
            DaylogCliError::Journal(e) => journal_error(e),
            DaylogCliError::Io(e) => CliError::new(
                "IO_ERROR",
                e.to_string(),
                Some("Check file paths and permissions"),
            ),
            DaylogCliError::Json(e) => {
                CliError::new("JSON_ERROR", e.to_string(), Some("Check JSON syntax"))
            }
            DaylogCliError::InvalidArgument(msg) => {
                CliError::new("INVALID_ARGUMENT", msg, Some("Run with --help for usage"))
            }
            DaylogCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                Some("Review the doctor report for details"),
            ),
        }
    }
}

fn journal_error(e: JournalError) -> CliError {
    let message = e.to_string();
    let (code, hint) = match &e {
        JournalError::CorruptStore(_) => (
            "CORRUPT_STORE",
            Some("Fix the store file by hand or restore a backup; nothing was written"),
        ),
        JournalError::UnknownField(_) => {
            ("UNKNOWN_FIELD", Some("Run 'daylog schema' to list fields"))
        }
        JournalError::SchemaCycle(_) | JournalError::InvalidSchema { .. } => {
            ("INVALID_SCHEMA", Some("Fix the [[fields]] declarations"))
        }
        JournalError::ConfigMissing(_) => (
            "CONFIG_MISSING",
            Some("Pass --config or set DAYLOG_CONFIG"),
        ),
        JournalError::ConfigMalformed { .. } => ("CONFIG_MALFORMED", Some("Check TOML syntax")),
        JournalError::InvalidDateRange(_) => ("INVALID_DATE_RANGE", None),
        JournalError::DateNotFound(_) => {
            ("DATE_NOT_FOUND", Some("Run 'daylog show' to list recorded dates"))
        }
        JournalError::EmptyStore => ("EMPTY_STORE", Some("Run 'daylog add' first")),
        JournalError::InvalidValue { .. } | JournalError::FieldKindMismatch { .. } => {
            ("INVALID_VALUE", Some("Run 'daylog schema' to see kinds and ranges"))
        }
        JournalError::InvalidWindow(_)
        | JournalError::InvalidPercentile(_)
        | JournalError::InvalidScale { .. }
        | JournalError::EmptyPeriod => ("INVALID_ARGUMENT", None),
        JournalError::Parse(_) => ("PARSE_ERROR", Some("Check input format")),
        JournalError::Input(_) => ("INPUT_ERROR", Some("Nothing was saved; run 'daylog add' again")),
        JournalError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
        JournalError::Json(_) => ("JSON_ERROR", Some("Check JSON syntax")),
    };
    CliError::new(code, message, hint)
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
