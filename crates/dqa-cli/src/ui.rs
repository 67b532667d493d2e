//! Terminal UI helpers

use colored::*;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, size},
};
use pulldown_cmark::{CodeBlockKind, Event as MdEvent, HeadingLevel, Parser, Tag, TagEnd};
use std::io::{self, IsTerminal, Write};

use dqa_core::{Result, SourceCitation};

const PROMPT: &str = "docqa>";
const EXCERPT_CHARS: usize = 240;

/// Display startup banner
pub fn display_banner() {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = std::cmp::min(67, terminal_width.saturating_sub(4)).max(40);

    let top_border = format!("┌{}┐", "─".repeat(banner_width - 2));
    let bottom_border = format!("└{}┘", "─".repeat(banner_width - 2));
    let empty_line = format!("│{}│", " ".repeat(banner_width - 2));

    println!();
    println!("{}", top_border.blue());
    println!("{}", empty_line.blue());

    let title = "docqa - Chat with your documents";
    let title_line = format!(
        "│  {}{}│",
        title.blue().bold(),
        " ".repeat(banner_width.saturating_sub(title.chars().count() + 4))
    );
    println!("{}", title_line);

    println!("{}", empty_line.blue());

    let feature_lines = [
        "Features:",
        "• Answers grounded in your PDF, text and HTML files",
        "• Cited sources with page numbers",
        "• Conversation memory for follow-up questions",
        "• Quick (stuff) and full (refine) summaries",
        "",
        "v0.1.0 • Powered by Ollama",
    ];

    for line in feature_lines {
        if line.is_empty() {
            println!("{}", empty_line.blue());
            continue;
        }

        let padding = " ".repeat(banner_width.saturating_sub(line.chars().count() + 4));
        let content = if line.starts_with("v0.1.0") {
            format!("│  {}{}│", line.dimmed(), padding)
        } else {
            format!("│  {}{}│", line, padding)
        };
        println!("{}", content.blue());
    }

    println!("{}", empty_line.blue());
    println!("{}", bottom_border.blue());
    println!();
    println!(
        "{}",
        "💡 Tip: Ask a question about your documents, or type 'help' for commands".dimmed()
    );
    println!();
}

/// Read one line, with ↑/↓ history navigation when attached to a terminal
pub async fn handle_input_with_history(history: &mut Vec<String>) -> Result<String> {
    // Piped input is read line by line without raw mode
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok("exit".to_string());
        }
        let input = input.trim().to_string();
        if !input.is_empty() {
            history.push(input.clone());
        }
        return Ok(input);
    }

    enable_raw_mode()?;
    let result = read_line_raw(history);
    disable_raw_mode()?;
    println!();

    let input = result?;
    if !input.is_empty() {
        history.push(input.clone());
    }
    Ok(input)
}

fn redraw(input: &str, previous_len: usize) -> io::Result<()> {
    let clear = " ".repeat(previous_len + 1);
    print!("\r{} {}\r{} {}", PROMPT.green().bold(), clear, PROMPT.green().bold(), input);
    io::stdout().flush()
}

fn read_line_raw(history: &[String]) -> Result<String> {
    let mut input = String::new();
    let mut history_index: Option<usize> = None;

    print!("{} ", PROMPT.green().bold());
    io::stdout().flush()?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }

        let previous_len = input.chars().count();
        match key_event.code {
            KeyCode::Enter => return Ok(input.trim().to_string()),
            KeyCode::Char('c') | KeyCode::Char('d')
                if key_event.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                return Ok("exit".to_string());
            }
            KeyCode::Char(c) => {
                input.push(c);
                redraw(&input, previous_len)?;
            }
            KeyCode::Backspace => {
                if input.pop().is_some() {
                    redraw(&input, previous_len)?;
                }
            }
            KeyCode::Up => {
                if !history.is_empty() {
                    let new_index = match history_index {
                        None => history.len() - 1,
                        Some(idx) if idx > 0 => idx - 1,
                        Some(idx) => idx,
                    };
                    history_index = Some(new_index);
                    input = history[new_index].clone();
                    redraw(&input, previous_len)?;
                }
            }
            KeyCode::Down => {
                if let Some(idx) = history_index {
                    if idx + 1 < history.len() {
                        history_index = Some(idx + 1);
                        input = history[idx + 1].clone();
                    } else {
                        history_index = None;
                        input.clear();
                    }
                    redraw(&input, previous_len)?;
                }
            }
            KeyCode::Esc => return Ok(String::new()),
            _ => {}
        }
    }
}

/// Display help message
pub fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {} - Ask about the processed documents", "<question>".green());
    println!("  {} - Index the files again, or a new set of files", "/process [files...]".green());
    println!("  {} - Summarize the documents (default: stuff)", "/summary [stuff|refine]".green());
    println!("  {} - Show the sources behind the last answer", "/sources".green());
    println!("  {} - Set answer tone and language", "/style <tone> [language]".green());
    println!("  {} - Clear the conversation", "/reset".green());
    println!("  {} - Show this help message", "help".green());
    println!("  {} - Exit the application", "exit/quit".green());
    println!();
    println!("{}", "Tones:".bold());
    println!("  neutral, professional, friendly, concise, detailed");
    println!();
    println!("{}", "Examples:".bold());
    println!("  What are the two main components of the Transformer?");
    println!("  /summary refine");
    println!("  /style concise French");
}

pub fn success(message: &str) {
    println!("{} {}", "✅".green(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "⚠️ ".yellow(), message.yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red());
}

pub fn progress(message: &str) {
    println!("{} {}", "🤖".blue(), message.dimmed());
}

/// Print one streamed answer fragment immediately
pub fn print_token(token: &str) {
    print!("{}", token);
    let _ = io::stdout().flush();
}

/// Render markdown answers for the terminal
pub fn render_markdown(markdown: &str) -> String {
    let mut out = String::new();
    let mut list_depth: usize = 0;
    let mut ordered: Vec<Option<u64>> = Vec::new();
    let mut style = InlineStyle::default();
    let mut in_code_block = false;

    for event in Parser::new(markdown) {
        match event {
            MdEvent::Start(Tag::Heading { level, .. }) => {
                style.heading = Some(level);
            }
            MdEvent::End(TagEnd::Heading(_)) => {
                style.heading = None;
                out.push_str("\n\n");
            }
            MdEvent::End(TagEnd::Paragraph) => {
                out.push_str(if list_depth > 0 { "\n" } else { "\n\n" });
            }
            MdEvent::Start(Tag::Strong) => style.strong = true,
            MdEvent::End(TagEnd::Strong) => style.strong = false,
            MdEvent::Start(Tag::Emphasis) => style.emphasis = true,
            MdEvent::End(TagEnd::Emphasis) => style.emphasis = false,
            MdEvent::Start(Tag::List(start)) => {
                if list_depth == 0 && !out.is_empty() && !out.ends_with("\n\n") {
                    out.push('\n');
                }
                list_depth += 1;
                ordered.push(start);
            }
            MdEvent::End(TagEnd::List(_)) => {
                list_depth = list_depth.saturating_sub(1);
                ordered.pop();
                if list_depth == 0 {
                    out.push('\n');
                }
            }
            MdEvent::Start(Tag::Item) => {
                out.push_str(&"  ".repeat(list_depth.saturating_sub(1)));
                match ordered.last_mut() {
                    Some(Some(n)) => {
                        out.push_str(&format!("{}. ", n));
                        *n += 1;
                    }
                    _ => out.push_str(&format!("{} ", "•".cyan())),
                }
            }
            MdEvent::End(TagEnd::Item) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            MdEvent::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        out.push_str(&format!("{}\n", lang.dimmed()));
                    }
                }
            }
            MdEvent::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                out.push('\n');
            }
            MdEvent::Text(text) => {
                if in_code_block {
                    for line in text.lines() {
                        out.push_str(&format!("    {}\n", line.yellow()));
                    }
                } else {
                    out.push_str(&style.apply(&text));
                }
            }
            MdEvent::Code(code) => out.push_str(&code.yellow().to_string()),
            MdEvent::SoftBreak => out.push(' '),
            MdEvent::HardBreak => out.push('\n'),
            MdEvent::Rule => out.push_str(&format!("{}\n\n", "─".repeat(40).dimmed())),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

#[derive(Default)]
struct InlineStyle {
    heading: Option<HeadingLevel>,
    strong: bool,
    emphasis: bool,
}

impl InlineStyle {
    fn apply(&self, text: &str) -> String {
        let mut styled = text.normal();
        if let Some(level) = self.heading {
            styled = styled.bold();
            if level == HeadingLevel::H1 {
                styled = styled.underline();
            }
        }
        if self.strong {
            styled = styled.bold();
        }
        if self.emphasis {
            styled = styled.italic();
        }
        styled.to_string()
    }
}

/// Shorten an excerpt to a readable preview on one line
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

pub fn format_location(citation: &SourceCitation) -> String {
    match citation.page {
        Some(page) => format!("{}, page {}", citation.source, page),
        None => citation.source.clone(),
    }
}

/// Print the sources panel for an answer
pub fn print_sources(sources: &[SourceCitation]) {
    if sources.is_empty() {
        println!("{}", "No sources were used for this answer.".dimmed());
        return;
    }

    println!("{}", format!("📚 Sources ({})", sources.len()).bold());
    for (i, citation) in sources.iter().enumerate() {
        println!("  {} {}", format!("[{}]", i + 1).cyan(), format_location(citation).bold());
        println!("      {}", excerpt(&citation.excerpt, EXCERPT_CHARS).dimmed());
    }
}
