// sigscictl - CLI for the Signal Sciences dashboard API
// Copyright (C) 2025 sigscictl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod client;
mod config;
mod error;
mod output;
mod pagination;
mod query;
mod timerange;

use crate::client::ApiClient;
use crate::config::{EffectiveConfig, Overrides, Scope, resolve as resolve_config, save};
use crate::output::{CsvSink, JsonSink, RecordKind, RecordSink, write_value};
use crate::query::{QuerySpec, SortOrder};
use crate::timerange::{QueryMode, now_epoch_minute};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::Write;
use std::{fs, path::PathBuf};

/// Attack and anomaly tags the dashboard defines out of the box. Site-defined
/// signals go through `--ctags` instead and are not validated here.
const BUILTIN_TAGS: &[&str] = &[
    "SQLI",
    "XSS",
    "CMDEXE",
    "TRAVERSAL",
    "USERAGENT",
    "BACKDOOR",
    "SCANNER",
    "RESPONSESPLIT",
    "CODEINJECTION",
    "HTTP4XX",
    "HTTP403",
    "HTTP404",
    "HTTP5XX",
    "HTTP500",
    "HTTP503",
    "SANS",
    "DATACENTER",
    "TORNODE",
    "NOUA",
    "NOTUTF8",
    "BLOCKED",
    "PRIVATEFILES",
    "FORCEFULBROWSING",
    "WEAKTLS",
    "LOGINATTEMPT",
    "LOGINSUCCESS",
    "LOGINFAILURE",
    "REGATTEMPT",
    "REGSUCCESS",
    "REGFAILURE",
];

#[derive(Parser)]
#[command(
    name = "sigscictl",
    version,
    about = "CLI for the Signal Sciences dashboard API"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Base URL for the dashboard (defaults to https://dashboard.signalsciences.net)"
    )]
    base_url: Option<String>,

    #[arg(long, global = true, help = "Corp override for this invocation")]
    corp: Option<String>,

    #[arg(long, global = true, help = "Site override for this invocation")]
    site: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist credentials and defaults to the chosen scope
    Configure {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        corp: Option<String>,
        #[arg(long)]
        site: Option<String>,
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Search request records (windowed pagination over the full range)
    Requests(RequestsArgs),
    /// Stream the request feed (cursor pagination, lags real time slightly)
    Feed(FeedArgs),
    /// Request counts per tag over time
    Timeseries(TimeseriesArgs),
    /// Security event operations
    #[command(subcommand)]
    Events(EventsCommand),
    /// Agent operations
    #[command(subcommand)]
    Agents(AgentsCommand),
    /// List corps visible to the account
    Corps {
        #[arg(long)]
        pretty: bool,
    },
    /// List sites in the corp
    Sites {
        #[arg(long)]
        pretty: bool,
    },
    /// List site members
    Members {
        #[arg(long)]
        pretty: bool,
    },
    /// List corp users
    Users {
        #[arg(long)]
        pretty: bool,
    },
    /// Fetch, push, or delete site configuration objects
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the built-in tag names accepted by --tags
    ListTags,
    /// Show current configuration (password masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Args)]
struct TimeArgs {
    #[arg(
        long,
        value_name = "EXPR",
        allow_hyphen_values = true,
        help = "Range start: -<n>d/-<n>h/-<n>m or epoch seconds (default -6h)"
    )]
    from: Option<String>,

    #[arg(
        long,
        value_name = "EXPR",
        allow_hyphen_values = true,
        help = "Range end: -<n>d/-<n>h/-<n>m or epoch seconds (default from+7d, capped at now)"
    )]
    until: Option<String>,
}

#[derive(Args)]
struct OutputArgs {
    #[arg(long, short = 'o', value_enum, default_value_t = Format::Json)]
    format: Format,

    #[arg(
        long,
        value_name = "PATH",
        help = "Write records to PATH instead of stdout (JSON output becomes one array)"
    )]
    file: Option<PathBuf>,

    #[arg(long, help = "Pretty-print JSON records")]
    pretty: bool,
}

#[derive(Args)]
struct RequestsArgs {
    #[command(flatten)]
    time: TimeArgs,

    #[arg(
        long,
        value_name = "TAGS",
        value_delimiter = ',',
        help = "Built-in tags to filter on; prefix with - to exclude"
    )]
    tags: Vec<String>,

    #[arg(
        long,
        value_name = "TAGS",
        value_delimiter = ',',
        help = "Site-defined signal tags to filter on; prefix with - to exclude"
    )]
    ctags: Vec<String>,

    #[arg(long, value_name = "NAME", help = "Filter on the server hostname")]
    server: Option<String>,

    #[arg(long, value_name = "ADDR", help = "Filter on the remote IP")]
    ip: Option<String>,

    #[arg(
        long,
        value_enum,
        default_value_t = SortArg::Asc,
        help = "Sort order for single-shot --field queries; paginated `data` \
                retrieval always runs ascending"
    )]
    sort: SortArg,

    #[arg(
        long,
        default_value_t = 1000,
        value_parser = clap::value_parser!(u32).range(1..=1000),
        help = "Per-request record cap (single-shot --field queries only)"
    )]
    limit: u32,

    #[arg(
        long,
        value_enum,
        default_value_t = FieldArg::Data,
        help = "Response field to emit; `data` paginates the whole range"
    )]
    field: FieldArg,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct FeedArgs {
    #[command(flatten)]
    time: TimeArgs,

    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    tags: Vec<String>,

    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    ctags: Vec<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct TimeseriesArgs {
    #[command(flatten)]
    time: TimeArgs,

    #[arg(long, value_name = "TAGS", value_delimiter = ',', required = true)]
    tags: Vec<String>,

    #[arg(long, default_value_t = 60, help = "Bucket size in seconds")]
    rollup: u32,

    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand)]
enum EventsCommand {
    /// List security events in a time range
    List {
        #[command(flatten)]
        time: TimeArgs,
        #[arg(long, value_name = "TAG", help = "Only events for this built-in tag")]
        tag: Option<String>,
        #[arg(
            long,
            default_value_t = 1000,
            value_parser = clap::value_parser!(u32).range(1..=1000)
        )]
        limit: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fetch a single event by ID
    Get {
        #[arg(value_name = "EVENT_ID")]
        id: String,
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Subcommand)]
enum AgentsCommand {
    /// List agents for the site
    List {
        #[arg(long)]
        pretty: bool,
    },
    /// Fetch logs for one agent
    Logs {
        #[arg(value_name = "AGENT_NAME")]
        name: String,
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Fetch a configuration resource as JSON
    Get {
        #[arg(value_enum)]
        resource: ConfigResource,
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Push configuration objects from a JSON file
    Add {
        #[arg(value_enum)]
        resource: ConfigResource,
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Delete the configuration objects named by id in a JSON file
    Delete {
        #[arg(value_enum)]
        resource: ConfigResource,
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConfigResource {
    Alerts,
    Rules,
    CustomTags,
    WhitelistParameters,
    WhitelistPaths,
    Whitelist,
    Blacklist,
    RequestRules,
    SignalRules,
    Redactions,
    Integrations,
    Headerlinks,
}

impl ConfigResource {
    fn endpoint(self) -> &'static str {
        match self {
            ConfigResource::Alerts => "/alerts",
            ConfigResource::Rules => "/rules",
            ConfigResource::CustomTags => client::CUSTOM_TAGS_EP,
            ConfigResource::WhitelistParameters => "/paramwhitelist",
            ConfigResource::WhitelistPaths => "/pathwhitelist",
            ConfigResource::Whitelist => "/whitelist",
            ConfigResource::Blacklist => "/blacklist",
            ConfigResource::RequestRules => "/requestRules",
            ConfigResource::SignalRules => "/signalRules",
            ConfigResource::Redactions => "/redactions",
            ConfigResource::Integrations => "/integrations",
            ConfigResource::Headerlinks => "/headerLinks",
        }
    }

    fn read_only(self) -> bool {
        matches!(self, ConfigResource::Integrations | ConfigResource::Headerlinks)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum Format {
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Asc,
    Desc,
}

impl From<SortArg> for SortOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Asc => SortOrder::Asc,
            SortArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum FieldArg {
    All,
    #[value(name = "totalCount")]
    TotalCount,
    Next,
    Data,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("reading current directory")?;

    // These subcommands never touch the network.
    match &cli.command {
        Commands::Configure {
            email,
            password,
            corp,
            site,
            base_url,
            scope,
        } => {
            let mut existing = config::load_scope((*scope).into(), &cwd)?;
            if let Some(email) = email {
                existing.email = Some(email.clone());
            }
            if let Some(password) = password {
                existing.password = Some(password.clone());
            }
            if let Some(corp) = corp {
                existing.corp = Some(corp.clone());
            }
            if let Some(site) = site {
                existing.site = Some(site.clone());
            }
            if let Some(url) = base_url {
                existing.base_url = Some(url.clone());
            }
            if existing == config::Config::default() {
                bail!("nothing to save; provide at least one of --email/--password/--corp/--site/--base-url");
            }
            let path = save((*scope).into(), &existing, &cwd)?;
            println!("Saved configuration to {}", path.display());
            return Ok(());
        }
        Commands::ConfigShow => {
            let mut merged = config::load(&cwd)?;
            if merged.password.is_some() {
                merged.password = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&merged)?);
            return Ok(());
        }
        Commands::ListTags => {
            println!("Supported tags:");
            for tag in BUILTIN_TAGS {
                println!("\t{tag}");
            }
            return Ok(());
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Zsh => {
                    generate(shells::Zsh, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut std::io::stdout())
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let overrides = Overrides {
        corp: cli.corp.clone(),
        site: cli.site.clone(),
        base_url: cli.base_url.clone(),
    };
    let effective = resolve_config(&cwd, &overrides)?;

    match cli.command {
        Commands::Requests(args) => run_requests(&effective, args),
        Commands::Feed(args) => run_feed(&effective, args),
        Commands::Timeseries(args) => run_timeseries(&effective, args),
        Commands::Events(command) => match command {
            EventsCommand::List {
                time,
                tag,
                limit,
                output,
            } => run_events_list(&effective, time, tag, limit, output),
            EventsCommand::Get { id, pretty } => {
                let client = connect(&effective)?;
                let event = client.event_by_id(&id)?;
                print_value(&event, pretty)
            }
        },
        Commands::Agents(command) => match command {
            AgentsCommand::List { pretty } => {
                let client = connect(&effective)?;
                print_value(&client.agents()?, pretty)
            }
            AgentsCommand::Logs { name, pretty } => {
                let client = connect(&effective)?;
                print_value(&client.agent_logs(&name)?, pretty)
            }
        },
        Commands::Corps { pretty } => {
            let client = connect(&effective)?;
            print_value(&client.corps()?, pretty)
        }
        Commands::Sites { pretty } => {
            let client = connect(&effective)?;
            print_value(&client.sites()?, pretty)
        }
        Commands::Members { pretty } => {
            let client = connect(&effective)?;
            print_value(&client.members()?, pretty)
        }
        Commands::Users { pretty } => {
            let client = connect(&effective)?;
            print_value(&client.users()?, pretty)
        }
        Commands::Config(command) => run_config(&effective, command),
        Commands::Configure { .. }
        | Commands::ConfigShow
        | Commands::ListTags
        | Commands::Completion { .. } => unreachable!("handled earlier"),
    }
}

fn connect(effective: &EffectiveConfig) -> Result<ApiClient> {
    let mut client = ApiClient::new(
        &effective.base_url,
        &effective.email,
        &effective.password,
        &effective.corp,
        &effective.site,
    )?;
    client.login()?;
    Ok(client)
}

fn run_requests(effective: &EffectiveConfig, args: RequestsArgs) -> Result<()> {
    // Resolve the range before logging in so a bad expression fails without
    // network traffic.
    let now = now_epoch_minute();
    let range = timerange::resolve(
        args.time.from.as_deref(),
        args.time.until.as_deref(),
        QueryMode::Standard,
        now,
    )?;

    let mut spec = QuerySpec::new(range);
    spec.tags = normalize_tags(&args.tags)?;
    spec.custom_tags = args.ctags.clone();
    spec.server = args.server.clone();
    spec.ip = args.ip.clone();
    spec.sort = args.sort.into();

    let mut client = connect(effective)?;

    if args.field == FieldArg::Data {
        let mut sink = open_sink(&args.output, RecordKind::Request)?;
        pagination::run_bounded(&mut client, &mut spec, now, sink.as_mut())?;
        return Ok(());
    }

    let envelope = client.search_once(&spec.build(), args.limit as usize)?;
    let shown = match args.field {
        FieldArg::All => envelope,
        FieldArg::TotalCount => envelope.get("totalCount").cloned().unwrap_or(Value::Null),
        FieldArg::Next => envelope.get("next").cloned().unwrap_or(Value::Null),
        FieldArg::Data => unreachable!("paginated above"),
    };
    let mut out = open_out(&args.output.file)?;
    write_value(&mut out, &shown, args.output.pretty)?;
    Ok(())
}

fn run_feed(effective: &EffectiveConfig, args: FeedArgs) -> Result<()> {
    let now = now_epoch_minute();
    let range = timerange::resolve(
        args.time.from.as_deref(),
        args.time.until.as_deref(),
        QueryMode::Feed,
        now,
    )?;

    let mut tags = normalize_tags(&args.tags)?;
    tags.extend(args.ctags.iter().cloned());

    let mut client = connect(effective)?;
    let mut sink = open_sink(&args.output, RecordKind::Request)?;
    pagination::run_cursor(&mut client, &range, &tags, sink.as_mut())?;
    Ok(())
}

fn run_timeseries(effective: &EffectiveConfig, args: TimeseriesArgs) -> Result<()> {
    let now = now_epoch_minute();
    let range = timerange::resolve(
        args.time.from.as_deref(),
        args.time.until.as_deref(),
        QueryMode::Timeseries,
        now,
    )?;
    let tags = normalize_tags(&args.tags)?;

    let client = connect(effective)?;
    let series = client.timeseries(&range, &tags, args.rollup)?;
    let mut out = open_out(&args.file)?;
    write_value(&mut out, &series, args.pretty)?;
    Ok(())
}

fn run_events_list(
    effective: &EffectiveConfig,
    time: TimeArgs,
    tag: Option<String>,
    limit: u32,
    output: OutputArgs,
) -> Result<()> {
    let now = now_epoch_minute();
    let range = timerange::resolve(
        time.from.as_deref(),
        time.until.as_deref(),
        QueryMode::Standard,
        now,
    )?;
    let tag = match tag {
        Some(raw) => Some(normalize_tags(std::slice::from_ref(&raw))?.remove(0)),
        None => None,
    };

    let client = connect(effective)?;
    let envelope = client.events(&range, tag.as_deref(), limit as usize)?;

    let mut sink = open_sink(&output, RecordKind::Event)?;
    if let Some(records) = envelope.get("data").and_then(Value::as_array) {
        for record in records {
            sink.write(record)?;
        }
    }
    sink.finish()?;
    Ok(())
}

fn run_config(effective: &EffectiveConfig, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Get {
            resource,
            file,
            pretty,
        } => {
            let client = connect(effective)?;
            let value = client.get_site_endpoint(resource.endpoint())?;
            let mut out = open_out(&file)?;
            write_value(&mut out, &value, pretty)?;
            Ok(())
        }
        ConfigCommand::Add { resource, file } => {
            if resource.read_only() {
                bail!("{} is read-only", resource.endpoint().trim_start_matches('/'));
            }
            let payload = read_json_file(&file)?;
            let client = connect(effective)?;
            client.post_config(resource.endpoint(), &payload)?;
            Ok(())
        }
        ConfigCommand::Delete { resource, file } => {
            if resource.read_only() {
                bail!("{} is read-only", resource.endpoint().trim_start_matches('/'));
            }
            let payload = read_json_file(&file)?;
            let client = connect(effective)?;
            client.delete_config(resource.endpoint(), &payload)?;
            Ok(())
        }
    }
}

/// Uppercase tag names and check them against the built-in set, keeping a
/// leading exclusion marker intact.
fn normalize_tags(raw: &[String]) -> Result<Vec<String>> {
    raw.iter()
        .map(|tag| {
            let (marker, name) = match tag.strip_prefix('-') {
                Some(name) => ("-", name),
                None => ("", tag.as_str()),
            };
            let upper = name.trim().to_ascii_uppercase();
            if !BUILTIN_TAGS.contains(&upper.as_str()) {
                return Err(anyhow!(
                    "unsupported tag `{name}`; `sigscictl list-tags` shows the built-in set"
                ));
            }
            Ok(format!("{marker}{upper}"))
        })
        .collect()
}

fn open_out(file: &Option<PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match file {
        Some(path) => Box::new(
            fs::File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    })
}

fn open_sink(args: &OutputArgs, kind: RecordKind) -> Result<Box<dyn RecordSink>> {
    let framed = args.file.is_some();
    let out = open_out(&args.file)?;
    Ok(match args.format {
        Format::Json => Box::new(JsonSink::new(out, framed, args.pretty)),
        Format::Csv => Box::new(CsvSink::new(out, kind)),
    })
}

fn print_value(value: &Value, pretty: bool) -> Result<()> {
    let mut out = std::io::stdout();
    write_value(&mut out, value, pretty)?;
    Ok(())
}

fn read_json_file(path: &PathBuf) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {} as JSON", path.display()))
}
