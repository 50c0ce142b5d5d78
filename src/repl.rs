use std::io::{BufRead, Write};

use crate::chat::{Role, Turn};
use crate::conversation::Conversation;
use crate::error::{GenerationError, Result};
use crate::gateway::CompletionEngine;

/// History entries longer than this are cut when listed
const HISTORY_PREVIEW_CHARS: usize = 100;

/// A line typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Reset,
    History,
    Help,
    /// `system` alone asks for the prompt on the next line
    System(Option<String>),
    Message(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }

        match line.to_lowercase().as_str() {
            "quit" | "exit" | "q" => return Command::Quit,
            "reset" | "clear" => return Command::Reset,
            "history" => return Command::History,
            "help" => return Command::Help,
            "system" => return Command::System(None),
            _ => {}
        }

        match line.split_once(':') {
            Some((head, rest)) if head.eq_ignore_ascii_case("system") => {
                Command::System(Some(rest.trim().to_string()))
            }
            _ => Command::Message(line.to_string()),
        }
    }
}

/// Render non-system turns as a numbered list, long messages shortened
pub fn render_history(turns: &[Turn]) -> String {
    let mut out = String::new();
    for (i, turn) in turns
        .iter()
        .filter(|turn| turn.role() != Role::System)
        .enumerate()
    {
        out.push_str(&format!(
            "  {}. {}: {}\n",
            i + 1,
            turn.role().title(),
            preview(turn.content())
        ));
    }
    out
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(HISTORY_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

fn print_help(output: &mut impl Write) -> Result<()> {
    writeln!(output, "\nAvailable Commands:")?;
    writeln!(output, "  quit/exit/q      - Exit the chat")?;
    writeln!(output, "  reset            - Clear conversation history")?;
    writeln!(output, "  history          - View conversation history")?;
    writeln!(output, "  system           - Change system prompt")?;
    writeln!(output, "  system: <prompt> - Change system prompt inline")?;
    writeln!(output, "  help             - Show this help message")?;
    Ok(())
}

/// Run the interactive chat until `quit` or end of input
pub fn run<E, R, W>(chat: &mut Conversation<E>, mut input: R, output: &mut W) -> Result<()>
where
    E: CompletionEngine,
    R: BufRead,
    W: Write,
{
    writeln!(output, "\nInteractive chat mode (type 'quit', 'exit', or 'q' to exit)")?;
    writeln!(output, "Type 'help' for available commands")?;

    let mut line = String::new();
    loop {
        write!(output, "\nYou: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }

        match Command::parse(&line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Reset => {
                chat.reset();
                writeln!(output, "Conversation history reset")?;
            }
            Command::History => {
                writeln!(output, "\nConversation History:")?;
                write!(output, "{}", render_history(chat.session().turns()))?;
            }
            Command::Help => print_help(output)?,
            Command::System(inline) => {
                let prompt = match inline {
                    Some(prompt) => prompt,
                    None => {
                        write!(output, "Enter new system prompt: ")?;
                        output.flush()?;
                        line.clear();
                        input.read_line(&mut line)?;
                        line.trim().to_string()
                    }
                };
                if prompt.is_empty() {
                    writeln!(output, "System prompt unchanged")?;
                } else {
                    chat.set_system_prompt(&prompt);
                    writeln!(output, "System prompt updated")?;
                }
            }
            Command::Message(message) => match chat.send(&message) {
                Ok(reply) => writeln!(output, "Assistant: {}", reply.content())?,
                Err(GenerationError::EmptyCompletion) => {
                    writeln!(output, "Assistant: I'm not sure how to respond to that.")?
                }
                Err(e) => writeln!(output, "{}", e)?,
            },
        }
    }

    writeln!(output, "Goodbye!")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::gateway::tests::StubEngine;

    fn run_script(chat: &mut Conversation<StubEngine>, script: &str) -> String {
        let mut output = Vec::new();
        run(chat, script.as_bytes(), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("  QUIT \n"), Command::Quit);
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(Command::parse("Reset"), Command::Reset);
        assert_eq!(Command::parse("history"), Command::History);
        assert_eq!(Command::parse("system"), Command::System(None));
        assert_eq!(
            Command::parse("system: be brief"),
            Command::System(Some("be brief".into()))
        );
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(
            Command::parse("what is 2+2?"),
            Command::Message("what is 2+2?".into())
        );
        assert_eq!(
            Command::parse("note: remember this"),
            Command::Message("note: remember this".into())
        );
    }

    #[test]
    fn history_skips_system_and_shortens() {
        let long = "x".repeat(150);
        let rendered = render_history(&[
            Turn::system("sys"),
            Turn::user("hi"),
            Turn::assistant(long.clone()),
        ]);
        assert_eq!(
            rendered,
            format!("  1. User: hi\n  2. Assistant: {}...\n", &long[..100])
        );
    }

    #[test]
    fn preview_counts_chars_not_bytes() {
        let text = "é".repeat(101);
        assert_eq!(preview(&text), format!("{}...", "é".repeat(100)));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn chat_session_end_to_end() {
        let engine = StubEngine::answering([Ok("Hello.".into()), Ok("".into())]);
        let mut chat = Conversation::with_system(engine, "You are terse.");

        let out = run_script(&mut chat, "Hi\n\nanything?\nhistory\nquit\n");

        assert!(out.contains("Assistant: Hello."));
        assert!(out.contains("Assistant: I'm not sure how to respond to that."));
        assert!(out.contains("  1. User: Hi\n  2. Assistant: Hello.\n"));
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(
            chat.history(),
            vec![
                Turn::system("You are terse."),
                Turn::user("Hi"),
                Turn::assistant("Hello."),
            ]
        );
    }

    #[test]
    fn failures_are_reported_and_loop_continues() {
        let engine = StubEngine::answering([Err(Error::Other("device lost".into()))]);
        let mut chat = Conversation::new(engine);

        let out = run_script(&mut chat, "Hi\nhelp\n");

        assert!(out.contains("Error generating response: Error: device lost"));
        assert!(out.contains("Available Commands:"));
        assert_eq!(chat.history().len(), 1);
    }

    #[test]
    fn system_prompt_commands() {
        let mut chat = Conversation::new(StubEngine::default());

        run_script(&mut chat, "system\nBe formal.\n");
        assert_eq!(chat.history()[0], Turn::system("Be formal."));

        run_script(&mut chat, "system: Be casual.\nreset\n");
        assert_eq!(chat.history(), vec![Turn::system("Be casual.")]);

        let out = run_script(&mut chat, "system\n\n");
        assert!(out.contains("System prompt unchanged"));
        assert_eq!(chat.history(), vec![Turn::system("Be casual.")]);
    }
}
