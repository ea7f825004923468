//! mntfs REPL: an interactive shell over one filesystem context.
//!
//! Every line is one command against the [`PathRouter`]:
//!
//! - `mount [dir]`, `unmount <name>`, `mounts`
//! - `ls`, `stat`, `cat`, `write`, `mkdir [-p]`, `rm`, `mv`, `cp`
//! - `watch <path> [ignore...]`, `unwatch [path]`
//! - Meta-commands: `/help`, `/quit`
//!
//! Watch events are buffered and printed after each command.
//!
//! [`PathRouter`]: mntfs_kernel::PathRouter

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use mntfs_kernel::state::paths;
use mntfs_kernel::{
    Bootstrapper, ChangeEvent, ChangeKind, ContextDeps, Encoding, FsContext, FsError, Stat,
    VfsConfig, WatchCallback,
};

/// What the caller should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(Option<String>),
    Quit,
}

/// REPL state: the context and the pending watch output.
pub struct Repl {
    ctx: FsContext,
    events: Arc<Mutex<Vec<String>>>,
}

impl Repl {
    pub fn new(ctx: FsContext) -> Self {
        Self {
            ctx,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn context(&self) -> &FsContext {
        &self.ctx
    }

    /// Watch output collected since the last call.
    pub fn drain_events(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Process a single line of input.
    ///
    /// Filesystem errors are part of the output, not an `Err`.
    pub async fn process_line(&mut self, line: &str) -> Result<Outcome> {
        let trimmed = line.trim();

        if trimmed.starts_with('/') && !trimmed.contains(' ') && is_meta(trimmed) {
            return Ok(self.handle_meta_command(trimmed));
        }

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(Outcome::Continue(None));
        }

        let words = split_words(trimmed)?;
        let Some((command, args)) = words.split_first() else {
            return Ok(Outcome::Continue(None));
        };

        let output = match self.execute(command, args).await {
            Ok(output) => output,
            Err(err) => Some(format!("Error: {err}")),
        };
        Ok(Outcome::Continue(output))
    }

    fn handle_meta_command(&self, cmd: &str) -> Outcome {
        match cmd {
            "/quit" | "/q" | "/exit" => Outcome::Quit,
            _ => Outcome::Continue(Some(HELP_TEXT.to_string())),
        }
    }

    async fn execute(&self, command: &str, args: &[String]) -> Result<Option<String>, FsError> {
        let router = self.ctx.router();
        match (command, args) {
            ("mount", []) => {
                let path = router.mount_native_folder(None).await?;
                Ok(Some(path))
            }
            ("mount", [dir]) => {
                let locator = host_path(dir).display().to_string();
                let handle = self.ctx.provider().open(&locator).await?;
                let path = router.mount_native_folder(Some(handle)).await?;
                Ok(Some(path))
            }
            ("unmount", [name]) => {
                router.unmount(name).await?;
                Ok(None)
            }
            ("mounts", []) => {
                let mounts = self.ctx.registry().mount_points();
                let lines: Vec<String> = mounts
                    .iter()
                    .map(|(name, handle)| format!("/mnt/{name}\t{}", handle.record().locator))
                    .collect();
                Ok(join_lines(lines))
            }
            ("ls", []) => Ok(join_lines(router.readdir("/").await?)),
            ("ls", [path]) => Ok(join_lines(router.readdir(path).await?)),
            ("stat", [path]) => Ok(Some(format_stat(&router.stat(path).await?))),
            ("cat", [path]) => Ok(Some(router.read_file(path, None).await?)),
            ("cat", [path, encoding]) => {
                let encoding: Encoding = encoding.parse()?;
                Ok(Some(router.read_file(path, Some(encoding)).await?))
            }
            ("write", [path, rest @ ..]) => {
                router.write_text(path, &rest.join(" "), None).await?;
                Ok(None)
            }
            ("mkdir", [flag, path]) if flag == "-p" => {
                router.mkdirs(path).await?;
                Ok(None)
            }
            ("mkdir", [path]) => {
                router.mkdir(path).await?;
                Ok(None)
            }
            ("rm", [path]) => {
                router.unlink(path).await?;
                Ok(None)
            }
            ("mv", [from, to]) => {
                router.rename(from, to).await?;
                Ok(None)
            }
            ("cp", [from, to]) => {
                router.copy(from, to).await?;
                Ok(None)
            }
            ("watch", [path, ignore @ ..]) => {
                router.watch(path, ignore, self.event_sink())?;
                Ok(Some(format!("watching {path}")))
            }
            ("unwatch", []) => {
                router.unwatch_all();
                Ok(None)
            }
            ("unwatch", [path]) => {
                let removed = router.unwatch(path);
                Ok(Some(format!("removed {removed} watch(es)")))
            }
            _ => Err(FsError::invalid(format!(
                "unknown command or wrong arguments: {command} (try /help)"
            ))),
        }
    }

    fn event_sink(&self) -> WatchCallback {
        let events = self.events.clone();
        Arc::new(move |event: &ChangeEvent| {
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(format_event(event));
        })
    }
}

fn is_meta(cmd: &str) -> bool {
    matches!(cmd, "/help" | "/h" | "/?" | "/quit" | "/q" | "/exit")
}

/// Relative host paths are taken from the process working directory.
fn host_path(dir: &str) -> PathBuf {
    let path = Path::new(dir);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Split on whitespace, honoring single and double quotes.
fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        anyhow::bail!("unterminated quote");
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn join_lines(lines: Vec<String>) -> Option<String> {
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn format_time(time: Option<SystemTime>) -> String {
    match time {
        Some(t) => DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

fn format_stat(stat: &Stat) -> String {
    let kind = if stat.is_directory() { "directory" } else { "file" };
    format!(
        "name: {}\npath: {}\ntype: {kind}\nsize: {}\nmtime: {}",
        stat.name,
        stat.path,
        stat.size,
        format_time(stat.mtime)
    )
}

fn format_event(event: &ChangeEvent) -> String {
    let kind = match event.kind {
        ChangeKind::Created => "created",
        ChangeKind::Changed => "changed",
        ChangeKind::Deleted => "deleted",
    };
    format!("[{kind}] {}", event.full_path)
}

const HELP_TEXT: &str = r#"mntfs REPL

Meta:
  /help, /h, /?          Show this help
  /quit, /q, /exit       Exit the REPL

Mounts:
  mount [dir]            Mount a host directory under /mnt
  unmount <name>         Forget a mount
  mounts                 List mounts and their host locations

Files:
  ls [path]              List a directory (/mnt lists mounts)
  stat <path>            Show type, size and mtime
  cat <path> [encoding]  Print a file (utf8, latin1, hex, ...)
  write <path> <text>    Create or replace a file
  mkdir [-p] <path>      Create a directory (-p: with parents)
  rm <path>              Remove a file or empty directory
  mv <from> <to>         Rename within one backend
  cp <from> <to>         Copy between mounted folders

Watching:
  watch <path> [glob...] Print changes under path, skipping ignore globs
  unwatch [path]         Stop watching path (or everything)
"#;

/// Run the REPL.
pub fn run() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let config = VfsConfig::load()?;
    let deps = ContextDeps::local(&config);
    let ctx = FsContext::open(config, deps).await?;
    let boot = Bootstrapper::run(&ctx)
        .await
        .context("Failed to prepare the filesystem")?;

    println!("mntfs v{}", env!("CARGO_PKG_VERSION"));
    if boot.first_boot {
        println!("First start: created {} entries under /fs.", boot.created.len());
    }
    println!("Type /help for commands, /quit to exit.\n");

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;

    let history_path = paths::history_file();
    let _ = rl.load_history(&history_path);

    let mut repl = Repl::new(ctx);

    loop {
        for event in repl.drain_events() {
            println!("{}", event.cyan());
        }

        match rl.readline("mntfs> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());

                match repl.process_line(&line).await {
                    Ok(Outcome::Continue(Some(output))) if output.starts_with("Error:") => {
                        eprintln!("{}", output.red());
                    }
                    Ok(Outcome::Continue(Some(output))) => println!("{output}"),
                    Ok(Outcome::Continue(None)) => {}
                    Ok(Outcome::Quit) => break,
                    Err(e) => eprintln!("{}", format!("Error: {e}").red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&history_path);
    drop(boot);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_words_handles_quotes() {
        assert_eq!(
            split_words(r#"write "/fs/local/my file.txt" 'a b'  c"#).unwrap(),
            vec!["write", "/fs/local/my file.txt", "a b", "c"]
        );
        assert_eq!(split_words(r#"cat """#).unwrap(), vec!["cat", ""]);
        assert!(split_words(r#"cat "oops"#).is_err());
    }

    #[test]
    fn events_format_kind_and_path() {
        assert_eq!(
            format_event(&ChangeEvent::deleted("/mnt/p/x")),
            "[deleted] /mnt/p/x"
        );
    }

    #[test]
    fn missing_times_print_as_dash() {
        assert_eq!(format_time(None), "-");
    }
}
