// Interactive interview console
// Reads candidate answers from stdin and lets the avatar reply

use anyhow::Result;
use parley_avatar::{AvatarBackend, InterviewSession, NegotiationState, SessionSnapshot, Speaker};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

pub struct InterviewConsole<B: AvatarBackend> {
    session: InterviewSession<B>,
    banner: String,
    printed: usize,
}

enum Command {
    Answer(String),
    Transcript,
    Time,
    Help,
    Exit,
}

fn parse(line: &str) -> Option<Command> {
    match line {
        "" => None,
        "exit" | "quit" | "q" => Some(Command::Exit),
        "help" | "?" => Some(Command::Help),
        "transcript" => Some(Command::Transcript),
        "time" => Some(Command::Time),
        answer => Some(Command::Answer(answer.to_string())),
    }
}

impl<B: AvatarBackend> InterviewConsole<B> {
    pub fn new(session: InterviewSession<B>, banner: impl Into<String>) -> Self {
        Self {
            session,
            banner: banner.into(),
            printed: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!("{}", self.banner);
        println!(
            "Connecting to the interviewer ({})...",
            self.session.sequencer().backend().backend_name()
        );
        self.session.start().await?;
        self.session.settle().await?;
        self.print_new_entries();
        println!("Type your answer and press enter. 'help' lists commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            if self.session.is_over_time() {
                println!("Time is up.");
                break;
            }
            print!("you> ");
            std::io::stdout().flush()?;

            let line = match self.session.time_remaining() {
                Some(left) => tokio::select! {
                    line = lines.next_line() => line?,
                    _ = tokio::time::sleep(left) => {
                        println!();
                        println!("Time is up.");
                        break;
                    }
                },
                None => lines.next_line().await?,
            };
            let Some(line) = line else {
                break;
            };
            match parse(line.trim()) {
                None => continue,
                Some(Command::Exit) => break,
                Some(Command::Help) => print_help(),
                Some(Command::Transcript) => self.print_transcript(),
                Some(Command::Time) => match self.session.time_remaining() {
                    Some(left) => println!("{} min {} s left", left.as_secs() / 60, left.as_secs() % 60),
                    None => println!("No time limit."),
                },
                Some(Command::Answer(answer)) => {
                    if let Err(e) = self.answer(&answer).await {
                        println!("Error: {}", e);
                        if self.session.sequencer().backend().state() == NegotiationState::Failed {
                            break;
                        }
                    }
                }
            }
        }

        self.session.finish().await?;
        println!("Interview ended after {} exchanges.", self.session.transcript().len());
        Ok(())
    }

    async fn answer(&mut self, answer: &str) -> Result<()> {
        self.session.respond(answer).await?;
        self.session.settle().await?;
        self.print_new_entries();
        Ok(())
    }

    fn print_new_entries(&mut self) {
        for entry in &self.session.transcript()[self.printed..] {
            if entry.speaker == Speaker::Ai {
                println!("interviewer> {}", entry.content);
            }
        }
        self.printed = self.session.transcript().len();
    }

    fn print_transcript(&self) {
        for entry in self.session.transcript() {
            let who = match entry.speaker {
                Speaker::User => "you",
                Speaker::Ai => "interviewer",
            };
            println!("[{}] {}: {}", entry.timestamp.format("%H:%M:%S"), who, entry.content);
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <text>       answer the current question");
    println!("  transcript   show the conversation so far");
    println!("  time         show the time left");
    println!("  help, ?      show this help");
    println!("  exit, quit   end the interview");
}

/// Print every session state change until the engine goes away
pub async fn report_snapshots(mut snapshots: watch::Receiver<SessionSnapshot>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        match (&snapshot.last_error, snapshot.state) {
            (Some(error), NegotiationState::Failed) => {
                eprintln!("[session] failed: {}", error)
            }
            _ => tracing::debug!(
                state = %snapshot.state,
                session_id = snapshot.session_id.as_deref().unwrap_or("-"),
                generation = snapshot.generation,
                "session state changed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert!(parse("").is_none());
        assert!(matches!(parse("quit"), Some(Command::Exit)));
        assert!(matches!(parse("?"), Some(Command::Help)));
        assert!(matches!(parse("transcript"), Some(Command::Transcript)));
        assert!(matches!(parse("time"), Some(Command::Time)));
        match parse("I work on compilers") {
            Some(Command::Answer(text)) => assert_eq!(text, "I work on compilers"),
            _ => panic!("expected an answer"),
        }
    }
}
