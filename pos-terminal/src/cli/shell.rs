//! 交互式 shell
//!
//! 一个进程一个 [`Dispatcher`]，因此 `login` / `logout` 在整个 shell
//! 生命周期内切换同一个本地会话。

use std::io::{BufRead, Write};

use clap::Parser;
use shared::error::{AppError, AppResult, ErrorCode};

use super::commands::ShellLine;
use super::dispatch::{Dispatcher, read_confirmation};

pub struct Shell {
    dispatcher: Dispatcher,
}

impl Shell {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 逐行读取直到 EOF 或 `exit` / `quit`
    ///
    /// 命令错误只打印，不结束 shell。`audit purge` 的确认读取输入的下一行。
    pub async fn run<R: BufRead>(&mut self, mut input: R, out: &mut dyn Write) -> AppResult<()> {
        writeln!(out, "Type `help` for commands, `exit` to leave.")?;
        self.prompt(out)?;

        let mut buf = String::new();
        loop {
            buf.clear();
            if input.read_line(&mut buf)? == 0 {
                break;
            }
            let line = buf.trim_end_matches(['\n', '\r']);
            let tokens = match split_line(line) {
                Ok(tokens) => tokens,
                Err(e) => {
                    writeln!(out, "error: {}", e.message)?;
                    self.prompt(out)?;
                    continue;
                }
            };

            match tokens.first().map(String::as_str) {
                None => {}
                Some("exit" | "quit") => break,
                Some("help") => {
                    let help = <ShellLine as clap::CommandFactory>::command().render_help();
                    writeln!(out, "{help}")?;
                }
                Some(_) => match ShellLine::try_parse_from(&tokens) {
                    Ok(parsed) => {
                        let mut confirm =
                            |prompt: &str| read_confirmation(&mut input, prompt);
                        let result = self
                            .dispatcher
                            .dispatch_confirming(parsed.op, out, &mut confirm)
                            .await;
                        if let Err(e) = result {
                            writeln!(out, "error: {} (code {})", e.message, e.code.code())?;
                        }
                    }
                    Err(e) => writeln!(out, "{}", e.render())?,
                },
            }

            self.prompt(out)?;
        }

        Ok(())
    }

    fn prompt(&self, out: &mut dyn Write) -> AppResult<()> {
        match self.dispatcher.session().current_user() {
            Some(user) => write!(out, "pos({})> ", user.username)?,
            None => write!(out, "pos> ")?,
        }
        out.flush()?;
        Ok(())
    }
}

/// 按空白切分，支持单双引号与反斜杠转义
pub fn split_line(line: &str) -> AppResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"') | None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_token = true;
                }
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(AppError::with_message(
            ErrorCode::InvalidFormat,
            "Unterminated quote",
        ));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_and_quoted() {
        assert_eq!(
            split_line("  user add  bob cashier ").unwrap(),
            vec!["user", "add", "bob", "cashier"]
        );
        assert_eq!(
            split_line(r#"sensitive store customer 7 note "two words" "#).unwrap(),
            vec!["sensitive", "store", "customer", "7", "note", "two words"]
        );
        assert_eq!(split_line(r"login alice 'p\w d'").unwrap(), vec!["login", "alice", r"p\w d"]);
        assert_eq!(split_line(r"login alice Se\ cret").unwrap(), vec!["login", "alice", "Se cret"]);
        assert_eq!(split_line(r#"x """#).unwrap(), vec!["x", ""]);
        assert!(split_line("").unwrap().is_empty());
    }

    #[test]
    fn test_split_unterminated_quote() {
        let err = split_line("login 'alice").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFormat);
    }
}
