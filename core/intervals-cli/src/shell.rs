//! Interactive session shell.
//!
//! One thread owns the engine. A ticker thread posts a tick every second and
//! a reader thread posts stdin lines; both feed the same channel, so ticks and
//! commands are handled strictly in arrival order.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use intervals_core::{
    format_duration, EngineEvent, EngineState, LifecycleEngine, RecoveryResolver, RecoveryScan,
    Resolution,
};
use tracing::info;

use crate::error::CliError;
use crate::report;

const HELP: &str = "\
Commands:
  start <project>     start a session (project id or name)
  pause | resume
  continue [note]     check in and start the next interval (alias: note)
  break [note]        check in and end the session
  end                 end the session now
  status              show the countdown
  sync                recompute from the wall clock
  projects            list projects
  help | quit
";

enum Input {
    Tick,
    Line(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Pause,
    Resume,
    CheckIn(String),
    Break(String),
    End,
    Status,
    Sync,
    Projects,
    Help,
    Quit,
}

/// Parses one shell line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "start" if rest.is_empty() => return Err("usage: start <project>".to_string()),
        "start" => Command::Start(rest.to_string()),
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "continue" | "note" => Command::CheckIn(rest.to_string()),
        "break" => Command::Break(rest.to_string()),
        "end" => Command::End,
        "status" => Command::Status,
        "sync" => Command::Sync,
        "projects" => Command::Projects,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command: {} (try `help`)", other)),
    };
    Ok(Some(command))
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn read_line() -> io::Result<Option<String>> {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn recover(engine: &mut LifecycleEngine) -> Result<(), CliError> {
    let resolver = RecoveryResolver::default();
    let orphan = match resolver.scan(engine)? {
        RecoveryScan::Clean => return Ok(()),
        RecoveryScan::AutoDiscarded { .. } => {
            println!("Discarded a session abandoned more than a day ago.");
            return Ok(());
        }
        RecoveryScan::Pending(orphan) => orphan,
    };

    let name = orphan
        .project
        .as_ref()
        .map(|p| p.name.clone())
        .unwrap_or_else(|| orphan.session.label.clone());
    println!(
        "Found an unfinished {} session started {} ago.",
        name,
        format_duration(orphan.age_seconds)
    );

    loop {
        print!("[r]esume ({} left), [s]ave and end, or [d]iscard? ", format_duration(orphan.remaining_seconds));
        io::stdout().flush()?;
        let Some(answer) = read_line()? else {
            return Ok(());
        };
        let resolution = match answer.trim().to_ascii_lowercase().as_str() {
            "r" | "resume" => Resolution::Resume,
            "s" | "save" => Resolution::SaveAndEnd,
            "d" | "discard" => Resolution::Discard,
            _ => continue,
        };
        resolver.resolve(engine, &orphan, resolution)?;
        info!(?resolution, "Recovery resolved from terminal");
        return Ok(());
    }
}

fn find_project(engine: &LifecycleEngine, query: &str) -> Option<String> {
    engine
        .store()
        .projects()
        .into_iter()
        .find(|p| p.id == query || p.name.eq_ignore_ascii_case(query))
        .map(|p| p.id.clone())
}

fn execute(engine: &mut LifecycleEngine, command: Command) {
    match command {
        Command::Start(query) => match find_project(engine, &query) {
            None => {
                println!("Unknown project: {}", query);
                print!("{}", report::projects(&engine.store().projects()));
            }
            Some(project_id) => {
                if engine.start_session(&project_id).is_none() {
                    println!("A session is already open.");
                }
            }
        },
        Command::Pause => {
            if !engine.pause_session() {
                println!("Nothing is running.");
            }
        }
        Command::Resume => {
            if !engine.resume_session() {
                println!("Nothing is paused.");
            }
        }
        Command::CheckIn(note) => {
            if !engine.submit_check_in(&note) {
                println!("No check-in is due.");
            }
        }
        Command::Break(note) => {
            if !engine.finish_check_in(&note) {
                println!("No check-in is due.");
            }
        }
        Command::End => {
            if !engine.end_session() {
                println!("No session to end.");
            }
        }
        Command::Status => print!("{}", report::status(&engine.snapshot())),
        Command::Sync => {
            engine.app_foregrounded();
            print!("{}", report::status(&engine.snapshot()));
        }
        Command::Projects => print!("{}", report::projects(&engine.store().projects())),
        Command::Help => print!("{}", HELP),
        Command::Quit => {}
    }
}

/// Prints host side effects. Returns whether anything was printed.
fn print_events(engine: &mut LifecycleEngine) -> bool {
    let events = engine.take_events();
    for event in &events {
        match event {
            EngineEvent::SessionStarted { .. } => {
                print!("{}", report::status(&engine.snapshot()));
            }
            EngineEvent::IntervalCompleted {
                intervals_completed,
                chime,
                ..
            } => {
                if chime.is_some() {
                    print!("\x07");
                }
                println!(
                    "\nInterval {} complete. `continue [note]` or `break [note]`",
                    intervals_completed
                );
            }
            EngineEvent::CheckInSubmitted { note_saved, .. } => {
                if *note_saved {
                    println!("Note saved.");
                }
            }
            EngineEvent::SessionEnded { total_seconds, .. } => {
                println!("Session ended after {} of focus.", format_duration(*total_seconds));
            }
            EngineEvent::SessionDiscarded { .. } => println!("Session discarded."),
            EngineEvent::NotificationPermissionDenied => {
                println!("Notifications are unavailable; the countdown keeps running here.");
            }
        }
    }
    !events.is_empty()
}

fn spawn_ticker(tx: Sender<Input>) {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(1));
        if tx.send(Input::Tick).is_err() {
            break;
        }
    });
}

fn spawn_reader(tx: Sender<Input>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Input::Closed);
    });
}

pub fn run(mut engine: LifecycleEngine) -> Result<(), CliError> {
    recover(&mut engine)?;
    print_events(&mut engine);
    print!("{}", report::status(&engine.snapshot()));
    println!("Type `help` for commands.");

    let (tx, rx) = mpsc::channel();
    spawn_ticker(tx.clone());
    spawn_reader(tx);
    prompt();

    for input in rx {
        match input {
            Input::Tick => {
                engine.tick();
                if print_events(&mut engine) {
                    prompt();
                }
            }
            Input::Line(line) => {
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(&mut engine, command),
                    Ok(None) => {}
                    Err(message) => println!("{}", message),
                }
                print_events(&mut engine);
                prompt();
            }
            Input::Closed => break,
        }
    }

    if engine.state() != EngineState::Idle {
        println!("\nSession left open; you will be asked to recover it next time.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line_is_no_command() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_start_requires_project() {
        assert!(parse_command("start").is_err());
        assert_eq!(
            parse_command("start  Deep Work "),
            Ok(Some(Command::Start("Deep Work".to_string())))
        );
    }

    #[test]
    fn test_check_in_variants() {
        assert_eq!(
            parse_command("continue drafted outline"),
            Ok(Some(Command::CheckIn("drafted outline".to_string())))
        );
        assert_eq!(
            parse_command("note drafted outline"),
            Ok(Some(Command::CheckIn("drafted outline".to_string())))
        );
        assert_eq!(
            parse_command("continue"),
            Ok(Some(Command::CheckIn(String::new())))
        );
        assert_eq!(
            parse_command("BREAK done"),
            Ok(Some(Command::Break("done".to_string())))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_command("dance").unwrap_err().contains("dance"));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("pause"), Ok(Some(Command::Pause)));
        assert_eq!(parse_command("resume"), Ok(Some(Command::Resume)));
        assert_eq!(parse_command("end"), Ok(Some(Command::End)));
        assert_eq!(parse_command("sync"), Ok(Some(Command::Sync)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
    }
}
