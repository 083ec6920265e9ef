use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wikiclient_core::category::Category;
use wikiclient_core::config::{SessionOptions, credentials_from_env, load_config};
use wikiclient_core::edit::{EditIntent, EditMode, MoveFlags, Watchlist, delete, move_page, submit_edit};
use wikiclient_core::page::Page;
use wikiclient_core::session::{AuthState, Session};
use wikiclient_core::tokens::{TOKEN_ACTIONS, TokenState};
use wikiclient_core::user::User;

const DEFAULT_CONFIG_PATH: &str = ".wikiclient/config.toml";

#[derive(Debug, Parser)]
#[command(
    name = "wikiclient",
    version,
    about = "Command-line client for MediaWiki sites"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Reuse and persist session cookies in this file"
    )]
    cookie_file: Option<PathBuf>,
    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Show the endpoint and namespace table")]
    Info,
    #[command(about = "Load a page and print its metadata")]
    Page(PageArgs),
    #[command(about = "List the members of a category")]
    Members(MembersArgs),
    #[command(about = "Show account attributes of a user")]
    User(UserArgs),
    #[command(about = "Show which action tokens the session holds")]
    Tokens(TokensArgs),
    #[command(about = "Replace, append to, prepend to or create a page")]
    Edit(EditArgs),
    #[command(about = "Delete a page")]
    Delete(DeleteArgs),
    #[command(about = "Move a page to a new title")]
    Move(MoveArgs),
}

#[derive(Debug, Args)]
struct PageArgs {
    title: String,
    #[arg(long, help = "Print the page content")]
    content: bool,
    #[arg(long, help = "Follow redirects")]
    follow: bool,
}

#[derive(Debug, Args)]
struct MembersArgs {
    category: String,
    #[arg(long, help = "Follow continuation until every member is listed")]
    all: bool,
}

#[derive(Debug, Args)]
struct UserArgs {
    name: String,
}

#[derive(Debug, Args)]
struct TokensArgs {
    actions: Vec<String>,
}

#[derive(Debug, Args)]
struct EditArgs {
    title: String,
    #[arg(long, value_name = "PATH", help = "File holding the new text")]
    file: PathBuf,
    #[arg(long, default_value = "")]
    summary: String,
    #[arg(long, conflicts_with_all = ["prepend", "create"])]
    append: bool,
    #[arg(long, conflicts_with = "create")]
    prepend: bool,
    #[arg(long, help = "Fail if the page already exists")]
    create: bool,
    #[arg(long)]
    minor: bool,
    #[arg(long)]
    bot: bool,
    #[arg(long, help = "Ignore edit conflicts and recreate deleted pages")]
    force: bool,
}

#[derive(Debug, Args)]
struct DeleteArgs {
    title: String,
    #[arg(long, default_value = "")]
    reason: String,
}

#[derive(Debug, Args)]
struct MoveArgs {
    from: String,
    to: String,
    #[arg(long, default_value = "")]
    reason: String,
    #[arg(long, help = "Move the talk page as well")]
    move_talk: bool,
    #[arg(long, help = "Move subpages as well")]
    move_subpages: bool,
    #[arg(long, help = "Do not leave a redirect behind")]
    no_redirect: bool,
}

fn main() {
    init_tracing();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };

    dotenvy::dotenv().ok();
    let session = open_session(cli.config.as_deref(), cli.cookie_file.as_deref())?;
    let output = Output { json: cli.json };

    let result = match command {
        Commands::Info => run_info(&session, &output),
        Commands::Page(args) => run_page(&session, &output, args),
        Commands::Members(args) => run_members(&session, &output, args),
        Commands::User(args) => run_user(&session, &output, args),
        Commands::Tokens(args) => run_tokens(&session, &output, args),
        Commands::Edit(args) => run_edit(&session, &output, args),
        Commands::Delete(args) => run_delete(&session, &output, args),
        Commands::Move(args) => run_move(&session, &output, args),
    };

    if let Some(path) = &cli.cookie_file {
        save_cookies(&session, path)?;
    }
    result
}

fn open_session(config: Option<&Path>, cookie_file: Option<&Path>) -> Result<Session> {
    let config_path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path)?;
    let mut options: SessionOptions = config.session_options()?;

    let saved_cookies = match cookie_file {
        Some(path) if path.exists() => {
            let cookies = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Some(cookies.trim().to_string()).filter(|cookies| !cookies.is_empty())
        }
        _ => None,
    };
    if saved_cookies.is_none() {
        options.credentials = credentials_from_env();
    }
    debug!(api_url = %options.api_url(), "opening session");

    let session = Session::open(options).context("failed to open session")?;
    if let Some(cookies) = saved_cookies {
        session.import_cookies(&cookies);
    }
    Ok(session)
}

fn save_cookies(session: &Session, path: &Path) -> Result<()> {
    let Some(cookies) = session.export_cookies() else {
        return Ok(());
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, cookies).with_context(|| format!("failed to write {}", path.display()))
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, lines: &[(&str, String)]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
            return Ok(());
        }
        for (key, value) in lines {
            println!("{key}: {value}");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct InfoReport<'a> {
    endpoint: &'a wikiclient_core::site::Endpoint,
    namespaces: Vec<(i32, Vec<String>)>,
    authenticated_as: Option<String>,
}

fn run_info(session: &Session, output: &Output) -> Result<()> {
    let namespaces = session
        .namespaces()
        .ids()
        .map(|id| {
            let names = session
                .namespaces()
                .names_for(id)
                .map(<[String]>::to_vec)
                .unwrap_or_default();
            (id, names)
        })
        .collect::<Vec<_>>();
    let authenticated_as = match session.auth_state() {
        AuthState::Authenticated { username } => Some(username),
        AuthState::Anonymous => None,
    };
    let report = InfoReport {
        endpoint: session.endpoint(),
        namespaces,
        authenticated_as,
    };

    let endpoint = session.endpoint();
    let mut lines = vec![
        ("name", endpoint.name.clone()),
        ("project", endpoint.project.clone()),
        ("lang", endpoint.lang.clone()),
        ("base_url", endpoint.base_url.clone()),
        ("script_path", endpoint.script_path.clone()),
        ("article_path", endpoint.article_path.clone()),
        ("secure", format_flag(endpoint.secure).to_string()),
        (
            "user",
            report
                .authenticated_as
                .clone()
                .unwrap_or_else(|| "<anonymous>".to_string()),
        ),
    ];
    for (id, names) in &report.namespaces {
        let label = if names.first().is_some_and(String::is_empty) {
            "(main)".to_string()
        } else {
            names.join(", ")
        };
        lines.push(("namespace", format!("{id} {label}")));
    }
    output.emit(&report, &lines)
}

#[derive(Serialize)]
struct PageReport {
    title: Option<String>,
    exists: Option<bool>,
    namespace: Option<i32>,
    redirect: bool,
    last_revid: Option<u64>,
    last_editor: Option<String>,
    last_edited: Option<String>,
    creator: Option<String>,
    url: Option<String>,
    templates: Vec<String>,
    categories: Vec<String>,
    content: Option<String>,
}

fn run_page(session: &Session, output: &Output, args: PageArgs) -> Result<()> {
    let mut page = Page::new(args.title)?;
    if args.follow {
        page = page.following_redirects();
    }
    page.load(session)?;

    let report = PageReport {
        title: page.title().map(ToString::to_string),
        exists: page.exists(),
        namespace: page.namespace(),
        redirect: page.is_redirect(),
        last_revid: page.last_revid(),
        last_editor: page.last_editor().map(ToString::to_string),
        last_edited: page.last_edited().map(ToString::to_string),
        creator: page.creator().map(ToString::to_string),
        url: page.full_url().map(ToString::to_string),
        templates: page.templates().to_vec(),
        categories: page.categories(session),
        content: args
            .content
            .then(|| page.content().map(ToString::to_string))
            .flatten(),
    };
    let mut lines = vec![
        ("title", report.title.clone().unwrap_or_default()),
        ("exists", format_option_flag(report.exists)),
        ("redirect", format_flag(report.redirect).to_string()),
        ("last_revid", format_option(report.last_revid)),
        ("last_editor", report.last_editor.clone().unwrap_or_else(|| "n/a".to_string())),
        ("last_edited", report.last_edited.clone().unwrap_or_else(|| "n/a".to_string())),
        ("creator", report.creator.clone().unwrap_or_else(|| "n/a".to_string())),
        ("url", report.url.clone().unwrap_or_else(|| "n/a".to_string())),
        ("templates.count", report.templates.len().to_string()),
        ("categories.count", report.categories.len().to_string()),
    ];
    for category in &report.categories {
        lines.push(("category", category.clone()));
    }
    if let Some(content) = &report.content {
        lines.push(("content", format!("\n{content}")));
    }
    output.emit(&report, &lines)
}

fn run_members(session: &Session, output: &Output, args: MembersArgs) -> Result<()> {
    let mut category = Category::new(session, &args.category)?;
    category.load_members(session, args.all)?;
    category.load_counts(session)?;
    let Some(members) = category.members() else {
        bail!("category members were not loaded");
    };

    let mut lines = vec![
        ("category", category.title().to_string()),
        ("pages.count", members.pages.len().to_string()),
        ("subcategories.count", members.subcategories.len().to_string()),
        ("files.count", members.files.len().to_string()),
    ];
    if let Some(counts) = category.counts() {
        lines.push(("server.size", counts.size.to_string()));
    }
    for member in members
        .pages
        .iter()
        .chain(&members.subcategories)
        .chain(&members.files)
    {
        lines.push(("member", member.title.clone()));
    }
    output.emit(members, &lines)
}

fn run_user(session: &Session, output: &Output, args: UserArgs) -> Result<()> {
    let mut user = User::new(args.name)?;
    user.load(session)?;

    let mut lines = vec![
        ("name", user.name().to_string()),
        ("exists", format_option_flag(user.exists())),
        ("ip", format_flag(user.is_ip()).to_string()),
    ];
    if let Some(info) = user.info() {
        lines.push(("edit_count", format_option(info.edit_count)));
        lines.push(("registration", info.registration.clone().unwrap_or_else(|| "n/a".to_string())));
        lines.push(("groups", info.groups.join(", ")));
        lines.push(("blocked", format_flag(info.block.is_some()).to_string()));
        lines.push(("emailable", format_flag(info.emailable).to_string()));
    }
    output.emit(&user.info(), &lines)
}

fn run_tokens(session: &Session, output: &Output, args: TokensArgs) -> Result<()> {
    let requested = if args.actions.is_empty() {
        TOKEN_ACTIONS.to_vec()
    } else {
        args.actions.iter().map(String::as_str).collect()
    };
    let tokens = session.tokens(&requested)?;
    let report = tokens
        .iter()
        .map(|(action, state)| (action.clone(), matches!(state, TokenState::Present(_))))
        .collect::<std::collections::BTreeMap<_, _>>();
    let lines = report
        .iter()
        .map(|(action, granted)| (action.as_str(), format_flag(*granted).to_string()))
        .collect::<Vec<_>>();
    output.emit(&report, &lines)
}

fn run_edit(session: &Session, output: &Output, args: EditArgs) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let mode = if args.append {
        EditMode::Append
    } else if args.prepend {
        EditMode::Prepend
    } else if args.create {
        EditMode::Create
    } else {
        EditMode::Replace
    };
    let mut intent = EditIntent::new(text, mode).summary(args.summary);
    intent.minor = args.minor;
    intent.bot = args.bot;
    intent.force = args.force;

    let mut page = Page::new(args.title)?.without_content();
    page.load(session)?;
    let response = submit_edit(session, &mut page, &intent)?;
    let lines = vec![
        ("result", "Success".to_string()),
        ("newrevid", format_option(response.pointer("/edit/newrevid").and_then(|value| value.as_u64()))),
    ];
    output.emit(&response, &lines)
}

fn run_delete(session: &Session, output: &Output, args: DeleteArgs) -> Result<()> {
    let mut page = Page::new(args.title)?;
    let response = delete(session, &mut page, &args.reason, Watchlist::Preferences)?;
    let lines = vec![("deleted", page.title().unwrap_or_default().to_string())];
    output.emit(&response, &lines)
}

fn run_move(session: &Session, output: &Output, args: MoveArgs) -> Result<()> {
    let mut page = Page::new(args.from)?;
    let flags = MoveFlags {
        move_talk: args.move_talk,
        move_subpages: args.move_subpages,
        no_redirect: args.no_redirect,
        watchlist: Watchlist::Preferences,
    };
    let response = move_page(session, &mut page, &args.to, &args.reason, flags)?;
    let lines = vec![
        ("from", page.title().unwrap_or_default().to_string()),
        ("to", args.to),
    ];
    output.emit(&response, &lines)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_option_flag(value: Option<bool>) -> String {
    value
        .map(|value| format_flag(value).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_option<T: ToString>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}
