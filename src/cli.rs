use std::cmp;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use atty::Stream;
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::json;
use sozluk_rs::{
    DEFAULT_DATA_PATH, Outcome, Rect, Scroll, Session, Widget, WidgetConfig, normalize,
};
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sozluk-rs", about = "Search a Turkish etymological dictionary", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Vocabulary file (JSON object of word -> {"a": description}).
    #[arg(long, global = true, default_value = DEFAULT_DATA_PATH)]
    data: PathBuf,

    /// Widget tables (special codes, clickable words). Built-in tables when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one query through the widget and show the rendered definition.
    Lookup {
        /// Text as typed into the search box.
        query: String,
    },
    /// Replay typing `text` one character at a time.
    Type {
        text: String,
    },
    /// List dictionary words whose normalised form starts with a prefix.
    Prefix {
        prefix: String,
        /// Maximum number of matches to return.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the tooltip a clickable word would open.
    Meaning {
        word: String,
        /// Print every meaning set instead of one random pick.
        #[arg(long)]
        all: bool,
    },
    /// Summarise the loaded vocabulary and tables.
    Stats,
    /// Serve the widget over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();

    let config = match &cli.config {
        Some(path) => WidgetConfig::from_path(path)?,
        None => WidgetConfig::default(),
    };
    let widget = Arc::new(Widget::load(&cli.data, config)?);

    match cli.command {
        Command::Lookup { query } => handle_lookup(widget, &query, cli.json),
        Command::Type { text } => handle_type(widget, &text, cli.json),
        Command::Prefix { prefix, limit } => handle_prefix(&widget, &prefix, limit, cli.json),
        Command::Meaning { word, all } => handle_meaning(widget, &word, all, cli.json),
        Command::Stats => handle_stats(&widget, cli.json),
        #[cfg(feature = "web")]
        Command::Serve { addr } => {
            let config = sozluk_rs::web::WebConfig {
                addr,
                ..Default::default()
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(sozluk_rs::web::serve(widget, config))?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second initialisation (tests, embedding) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn ensure_loaded(widget: &Widget) -> Result<(), Box<dyn Error>> {
    match widget.load_error() {
        Some(err) => Err(format!("{}: {err}", sozluk_rs::LOAD_FAILURE_MESSAGE).into()),
        None => Ok(()),
    }
}

fn handle_lookup(widget: Arc<Widget>, query: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    ensure_loaded(&widget)?;
    let mut session = Session::new(widget);
    let outcome = session.input(query);
    let view = session.view();

    if as_json {
        let payload = json!({
            "query": query,
            "outcome": outcome,
            "view": view,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match &outcome {
        Outcome::Found { word } => {
            let ghost = view.ghost.as_ref().map_or("", |ghost| ghost.text.as_str());
            println!("{query}[{ghost}] -> {word}");
            render_markdown_block("Definition", &html_to_markdown(&view.result_html));
        }
        Outcome::NoMatch => println!("No word starts with \"{query}\"."),
        Outcome::Rejected => println!("Queries may not be blank or start with a space."),
        Outcome::Empty | Outcome::Unchanged => println!("Nothing to look up."),
        Outcome::Disabled => println!("{}", sozluk_rs::LOAD_FAILURE_MESSAGE),
    }
    Ok(())
}

fn handle_type(widget: Arc<Widget>, text: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    ensure_loaded(&widget)?;
    let mut session = Session::new(widget);
    let mut steps = Vec::new();
    for (idx, ch) in text.char_indices() {
        let typed = &text[..idx + ch.len_utf8()];
        let outcome = session.input(typed);
        let view = session.view();
        steps.push((
            typed.to_string(),
            outcome,
            view.ghost.as_ref().map(|ghost| ghost.text.clone()),
            view.error,
        ));
    }

    if as_json {
        let payload: Vec<_> = steps
            .iter()
            .map(|(typed, outcome, ghost, error)| {
                json!({"query": typed, "outcome": outcome, "ghost": ghost, "error": error})
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if steps.is_empty() {
        println!("Nothing typed.");
        return Ok(());
    }
    let width = steps
        .iter()
        .map(|(typed, ..)| typed.chars().count())
        .max()
        .unwrap_or(5)
        .max("TYPED".len());
    println!("{:<width$}  {:<12}  {}", "TYPED", "GHOST", "RESULT", width = width);
    println!("{:-<width$}  {:-<12}  {}", "", "", "------", width = width);
    for (typed, outcome, ghost, _) in &steps {
        let result = match outcome {
            Outcome::Found { word } => word.clone(),
            Outcome::NoMatch => "<no match>".to_string(),
            Outcome::Rejected => "<rejected>".to_string(),
            Outcome::Empty | Outcome::Unchanged | Outcome::Disabled => String::new(),
        };
        println!(
            "{:<width$}  {:<12}  {}",
            typed,
            ghost.as_deref().unwrap_or(""),
            result,
            width = width
        );
    }
    Ok(())
}

fn handle_prefix(
    widget: &Widget,
    prefix: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    ensure_loaded(widget)?;
    let Some(dictionary) = widget.dictionary() else {
        return Ok(());
    };
    let limit = cmp::max(1, limit);
    let normalized = normalize(prefix);
    let matches = dictionary.index().matches(&normalized, limit);

    if as_json {
        let payload = json!({
            "prefix": prefix,
            "normalized": normalized,
            "limit": limit,
            "results": matches.iter().map(|found| {
                json!({"word": found.original, "normalized": found.normalized})
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No words matched prefix \"{prefix}\".");
        return Ok(());
    }
    let width = matches
        .iter()
        .map(|found| found.original.chars().count())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("Matches for prefix \"{prefix}\":");
    println!("{:<width$}  {}", "WORD", "NORMALIZED", width = width);
    println!("{:-<width$}  {}", "", "----------", width = width);
    for found in &matches {
        println!("{:<width$}  {}", found.original, found.normalized, width = width);
    }
    Ok(())
}

fn handle_meaning(
    widget: Arc<Widget>,
    word: &str,
    all: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let (key, sets) = widget
        .config()
        .meanings_for(word)
        .ok_or_else(|| format!("\"{word}\" is not a clickable word"))?;

    if all {
        if as_json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"word": key, "meanings": sets}))?
            );
        } else {
            println!("Meanings for {key}:");
            for (idx, lines) in sets.iter().enumerate() {
                println!("  {}. {}", idx + 1, lines.join(" / "));
            }
        }
        return Ok(());
    }

    let mut session = Session::new(widget);
    let mut rng = rand::thread_rng();
    let tooltip = session
        .click(word, Rect::default(), Scroll::default(), &mut rng)
        .ok_or_else(|| format!("\"{word}\" has no meanings configured"))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(tooltip)?);
    } else {
        println!("{}:", tooltip.word);
        for line in &tooltip.lines {
            println!("  {line}");
        }
    }
    Ok(())
}

fn handle_stats(widget: &Widget, as_json: bool) -> Result<(), Box<dyn Error>> {
    let config = widget.config();
    let entries = widget.dictionary().map(|dictionary| dictionary.len());
    let keys = widget.dictionary().map(|dictionary| dictionary.index().len());
    let load_error = widget.load_error().map(|err| err.to_string());

    if as_json {
        let payload = json!({
            "entries": entries,
            "normalized_keys": keys,
            "special_codes": config.special_codes.len(),
            "clickable_words": config.clickable_words.len(),
            "load_error": load_error,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match (entries, keys) {
        (Some(entries), Some(keys)) => {
            println!("Entries: {entries}");
            println!("Distinct normalised keys: {keys}");
        }
        _ => println!("Vocabulary: {}", load_error.unwrap_or_default()),
    }
    println!("Special codes: {}", config.special_codes.len());
    println!("Clickable words: {}", config.clickable_words.len());
    render_markdown_block("Banner", &html_to_markdown(&widget.banner_html()));
    Ok(())
}

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9]*)([^>]*)>"#).expect("valid tag pattern"));

/// Converts a rendered fragment to terminal markdown: labels become bold,
/// highlighted words and emphasis become italics, other tags are dropped.
fn html_to_markdown(html: &str) -> String {
    let mut open_spans: Vec<&'static str> = Vec::new();
    let converted = TAG.replace_all(html, |caps: &Captures<'_>| {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        match (name.as_str(), closing) {
            ("br", _) => "\n".to_string(),
            ("p", true) => "\n".to_string(),
            ("b" | "strong", _) => "**".to_string(),
            ("i" | "em", _) => "*".to_string(),
            ("span", false) => {
                let mark = if caps[3].contains("pink") { "*" } else { "" };
                open_spans.push(mark);
                mark.to_string()
            }
            ("span", true) => open_spans.pop().unwrap_or("").to_string(),
            _ => String::new(),
        }
    });
    converted
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
