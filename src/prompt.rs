use std::io::{BufRead, Write};

use anyhow::Context as _;

use crate::formats::CatalogEntry;

pub const MAX_MENU_ATTEMPTS: usize = 5;

/// The interactive side of a session: questions go out, one answer line comes back.
pub trait Console: Send {
    fn say(&mut self, line: &str) -> anyhow::Result<()>;

    /// Print `question` and return the trimmed answer line.
    fn ask(&mut self, question: &str) -> anyhow::Result<String>;
}

pub struct StdConsole<R, W> {
    input: R,
    output: W,
}

impl<R, W> StdConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl StdConsole<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R, W> Console for StdConsole<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn say(&mut self, line: &str) -> anyhow::Result<()> {
        writeln!(self.output, "{line}").context("write to console")?;
        self.output.flush().context("flush console")
    }

    fn ask(&mut self, question: &str) -> anyhow::Result<String> {
        write!(self.output, "{question} ").context("write prompt")?;
        self.output.flush().context("flush prompt")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("read console answer")?;
        if read == 0 {
            anyhow::bail!("console input closed");
        }
        Ok(line.trim().to_owned())
    }
}

/// `yes` or `y`, case-insensitive.
pub fn confirm(console: &mut dyn Console, question: &str) -> anyhow::Result<bool> {
    let answer = console.ask(&format!("{question} (yes/no):"))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "yes" | "y"))
}

/// Only a literal `yes` accepts; used per volume.
pub fn confirm_strict(console: &mut dyn Console, question: &str) -> anyhow::Result<bool> {
    let answer = console.ask(&format!("{question} (yes/no):"))?;
    Ok(answer.eq_ignore_ascii_case("yes"))
}

/// List the catalog and ask for an entry by its index. `None` for invalid input.
pub fn select_title<'a>(
    console: &mut dyn Console,
    entries: &'a [CatalogEntry],
) -> anyhow::Result<Option<&'a CatalogEntry>> {
    console.say("")?;
    console.say("Available books:")?;
    console.say(&"-".repeat(30))?;
    for entry in entries {
        console.say(&format!("({}) → {}", entry.index, entry.title))?;
    }

    let answer = console.ask("\nWhich book would you like to back up? (enter number):")?;
    let Ok(index) = answer.parse::<usize>() else {
        console.say("Please enter a valid number.")?;
        return Ok(None);
    };

    let selected = entries.iter().find(|entry| entry.index == index);
    if selected.is_none() {
        console.say("Invalid selection. Please choose a listed book number.")?;
    }
    Ok(selected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAction {
    AssemblePdf,
    PreserveImages,
    BackupAndQuit,
}

impl OutputAction {
    fn parse(answer: &str) -> Option<Self> {
        match answer.trim() {
            "1" => Some(Self::AssemblePdf),
            "2" => Some(Self::PreserveImages),
            "3" => Some(Self::BackupAndQuit),
            _ => None,
        }
    }
}

/// Numbered output menu. Invalid answers re-prompt up to [`MAX_MENU_ATTEMPTS`]
/// times, after which the session falls back to backup-and-quit.
pub fn choose_output_action(console: &mut dyn Console) -> anyhow::Result<OutputAction> {
    console.say("")?;
    console.say("Output options:")?;
    console.say("1. Generate PDF from pages")?;
    console.say("2. Keep as image directory")?;
    console.say("3. Save backup and quit")?;

    for _ in 0..MAX_MENU_ATTEMPTS {
        let answer = console.ask("\nSelect option (1, 2, or 3):")?;
        if let Some(action) = OutputAction::parse(&answer) {
            return Ok(action);
        }
        console.say("Invalid option. Please choose 1, 2, or 3.")?;
    }

    tracing::warn!(
        attempts = MAX_MENU_ATTEMPTS,
        "no valid output option chosen; keeping backup only"
    );
    Ok(OutputAction::BackupAndQuit)
}
