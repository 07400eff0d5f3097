//! Line-oriented terminal front end over [`ChatApp`].

use log::{ info, warn };
use std::error::Error;
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };

use crate::app::{ ChatApp, SessionPersistence };
use crate::cli::ChatArgs;
use crate::client::http::HttpSessionService;
use crate::config::prompt::{ load_prompts, QuickAction };
use crate::controller::Snapshot;
use crate::models::api::ExportFormat;
use crate::models::chat::{ Message, Reaction, Role };

const HELP: &str = "\
Commands:
  /new                     start a new chat
  /reset                   clear the current conversation
  /regen                   regenerate the last reply
  /like, /dislike          react to the last reply (again to undo)
  /sessions                list sessions
  /switch <id>             open another session
  /delete <id>             delete a session
  /title <text>            rename the current session
  /export [json|md|text]   print the current conversation
  /quick <action> <text>   explain, summarize, translate, improve, code
  /health                  check the chat service
  /help                    show this help
  /quit                    leave";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Say(String),
    New,
    Reset,
    Regenerate,
    React(Reaction),
    Sessions,
    Switch(String),
    Delete(String),
    Title(String),
    Export(ExportFormat),
    Quick(QuickAction, String),
    Health,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Say(line.to_string());
    };
    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();

    match name.to_lowercase().as_str() {
        "new" => ReplCommand::New,
        "reset" => ReplCommand::Reset,
        "regen" | "regenerate" => ReplCommand::Regenerate,
        "like" => ReplCommand::React(Reaction::Like),
        "dislike" => ReplCommand::React(Reaction::Dislike),
        "sessions" => ReplCommand::Sessions,
        "health" => ReplCommand::Health,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        "switch" | "delete" | "title" if rest.is_empty() =>
            ReplCommand::Invalid(format!("/{} needs an argument", name)),
        "switch" => ReplCommand::Switch(rest.to_string()),
        "delete" => ReplCommand::Delete(rest.to_string()),
        "title" => ReplCommand::Title(rest.to_string()),
        "export" if rest.is_empty() => ReplCommand::Export(ExportFormat::Json),
        "export" =>
            match rest.parse() {
                Ok(format) => ReplCommand::Export(format),
                Err(e) => ReplCommand::Invalid(e),
            }
        "quick" => {
            let (action, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match action.parse::<QuickAction>() {
                Ok(_) if text.trim().is_empty() =>
                    ReplCommand::Invalid("/quick needs some text".to_string()),
                Ok(action) => ReplCommand::Quick(action, text.trim().to_string()),
                Err(e) => ReplCommand::Invalid(e.to_string()),
            }
        }
        other => ReplCommand::Invalid(format!("Unknown command /{}", other)),
    }
}

fn print_message(msg: &Message) {
    let reaction = match msg.reaction {
        Some(Reaction::Like) => " [+]",
        Some(Reaction::Dislike) => " [-]",
        None => "",
    };
    println!("{}{}: {}", msg.role.display_name(), reaction, msg.content);
    if let Some(latency) = msg.metadata.as_ref().and_then(|m| m.latency_ms) {
        println!("  ({} ms)", latency);
    }
}

fn print_transcript(app: &ChatApp) {
    let snapshot = app.snapshot();
    println!("-- session {} --", snapshot.session_id);
    snapshot.messages.iter().for_each(print_message);
}

fn print_error(app: &ChatApp) {
    if let Some(error) = app.snapshot().error {
        println!("! {}", error);
    }
}

/// Prints whatever the last operation appended, then any error it left.
fn print_update(app: &ChatApp, before: usize) {
    app.snapshot().messages.iter().skip(before).for_each(print_message);
    print_error(app);
}

/// The newest message of `now` if an operation rewrote it in place.
fn replaced_reply<'a>(prior: &Snapshot, now: &'a Snapshot) -> Option<&'a Message> {
    let latest = now.messages.last()?;
    (prior.messages.last() != Some(latest)).then_some(latest)
}

fn last_assistant(app: &ChatApp) -> Option<String> {
    app.snapshot()
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.id.clone())
}

/// Last session remembered in `path`, if any.
pub fn read_session_file(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Persistence callback writing every newly bound session id to `path`.
pub fn session_file_persistence(path: PathBuf) -> SessionPersistence {
    Box::new(move |session_id: &str| {
        if let Err(e) = fs::write(&path, session_id) {
            warn!("Could not remember session in {}: {}", path.display(), e);
        }
    })
}

async fn handle(app: &mut ChatApp, command: ReplCommand) -> bool {
    let before = app.snapshot().messages.len();
    match command {
        ReplCommand::Empty => {}
        ReplCommand::Quit => {
            return false;
        }
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Invalid(reason) => println!("! {}", reason),
        ReplCommand::Say(text) => {
            app.send(&text).await;
            print_update(app, before);
        }
        ReplCommand::Quick(action, text) => {
            app.quick_action(action, &text).await;
            print_update(app, before);
        }
        ReplCommand::New => {
            app.new_chat().await;
            print_transcript(app);
        }
        ReplCommand::Reset => {
            app.reset().await;
            print_transcript(app);
            print_error(app);
        }
        ReplCommand::Regenerate => {
            let prior = app.snapshot();
            app.regenerate_last().await;
            let now = app.snapshot();
            if now == prior {
                println!("! Nothing to regenerate");
            } else {
                replaced_reply(&prior, &now).into_iter().for_each(print_message);
                print_error(app);
            }
        }
        ReplCommand::React(reaction) => {
            let updated = match last_assistant(app) {
                Some(id) => app.runtime_mut().toggle_reaction(&id, reaction),
                None => false,
            };
            if updated {
                println!("Reaction updated");
            } else {
                println!("! No reply to react to");
            }
        }
        ReplCommand::Sessions => {
            let current = app.current_session().to_string();
            match app.refresh_sessions().await {
                Ok(sessions) if sessions.is_empty() => println!("No sessions yet"),
                Ok(sessions) => {
                    for s in sessions {
                        let marker = if s.id == current { "*" } else { " " };
                        println!("{} {}  {} ({} messages)", marker, s.id, s.title, s.message_count);
                    }
                }
                Err(e) => println!("! {}", e.describe()),
            }
        }
        ReplCommand::Switch(id) => {
            app.switch_session(&id).await;
            print_transcript(app);
            print_error(app);
        }
        ReplCommand::Delete(id) => {
            match app.delete_session(&id).await {
                Ok(()) => println!("Deleted {}", id),
                Err(e) => println!("! {}", e.describe()),
            }
        }
        ReplCommand::Title(title) => {
            let current = app.current_session().to_string();
            match app.rename_session(&current, &title).await {
                Ok(()) => println!("Renamed to '{}'", title),
                Err(e) => println!("! {}", e.describe()),
            }
        }
        ReplCommand::Export(format) => {
            match app.export_current(format).await {
                Ok(body) => println!("{}", body),
                Err(e) => println!("! {}", e.describe()),
            }
        }
        ReplCommand::Health => {
            if app.check_health().await {
                println!("Chat service is reachable");
            } else {
                println!("! Chat service is unreachable");
            }
        }
    }
    true
}

pub async fn run_chat(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let service = HttpSessionService::new(
        &args.api_url,
        Some(Duration::from_secs(args.timeout_secs))
    )?;
    let prompts = load_prompts(args.prompts_path.as_deref())?;
    let session_file = PathBuf::from(&args.session_file);
    let initial = args.session_id.clone().or_else(|| read_session_file(&session_file));

    let mut app = ChatApp::new(
        Arc::new(service),
        args.generation_config(),
        args.controller_options(),
        prompts
    ).with_persistence(session_file_persistence(session_file));

    app.start(initial).await;
    info!("Chat client bound to session {}", app.current_session());
    print_transcript(&app);
    print_error(&app);
    println!("Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !handle(&mut app, parse_command(&line)).await {
            break;
        }
    }
    Ok(())
}
