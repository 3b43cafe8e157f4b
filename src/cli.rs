use std::ffi::OsString;
use std::io::{self, Read};

use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser};

use crate::config_store::Defaults;
use crate::error::{Error, Result};

/// Ask a large language model a question and print the answer.
///
/// Text piped on stdin is appended to the prompt after a blank line.
#[derive(Parser, Debug)]
#[command(name = "äh", bin_name = "aeh", version)]
pub struct Cli {
    /// The model to use (defaults to `defaults.model` from the config file)
    #[arg(short = 'm', long = "model", value_name = "MODEL")]
    pub model: Option<String>,

    /// The sampling temperature to use, see
    /// <https://platform.openai.com/docs/api-reference/chat/create#chat/create-temperature>
    #[arg(
        short = 't',
        long = "temperature",
        value_name = "TEMPERATURE",
        allow_negative_numbers = true
    )]
    pub temperature: Option<f64>,

    /// The prompt, quoted as a single argument
    #[arg(value_name = "PROMPT")]
    pub args: Vec<String>,
}

/// Outcome of argument parsing that is not an error.
#[derive(Debug)]
pub enum Invocation {
    Run(Cli),
    /// `--help` or `--version`; the text is ready for stdout.
    Informational(String),
}

impl Cli {
    pub fn parse_from_args<I, T>(args: I) -> Result<Invocation>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(cli) => Ok(Invocation::Run(cli)),
            Err(err)
                if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion
                ) =>
            {
                Ok(Invocation::Informational(err.render().to_string()))
            }
            Err(err) => Err(Error::Usage(err.render().to_string().trim_end().to_string())),
        }
    }

    /// The single positional prompt.
    pub fn prompt(&self) -> Result<&str> {
        match self.args.as_slice() {
            [] => Err(usage_error("no prompt given")),
            [prompt] if prompt.is_empty() => Err(usage_error("no prompt given")),
            [prompt] => Ok(prompt),
            _ => Err(usage_error(
                "additional command line (non-flag) arguments specified, which is invalid",
            )),
        }
    }

    pub fn model_or<'a>(&'a self, defaults: &'a Defaults) -> &'a str {
        self.model.as_deref().unwrap_or(&defaults.model)
    }

    pub fn temperature_or(&self, defaults: &Defaults) -> f64 {
        self.temperature.unwrap_or(defaults.temperature)
    }
}

fn usage_error(reason: &str) -> Error {
    let help = Cli::command().render_help();
    Error::Usage(format!("{reason}\n\n{}", help.to_string().trim_end()))
}

/// Reads all of stdin unless it is an interactive terminal.
pub fn read_piped_input(stdin_is_terminal: bool, mut reader: impl Read) -> io::Result<String> {
    if stdin_is_terminal {
        return Ok(String::new());
    }
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn compose_prompt(prompt: &str, piped: &str) -> String {
    if piped.is_empty() {
        prompt.to_string()
    } else {
        format!("{prompt}\n\n{piped}")
    }
}
