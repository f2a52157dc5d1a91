use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// A program plus arguments, written in config as a non-empty string array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl TryFrom<Vec<String>> for CommandSpec {
    type Error = anyhow::Error;

    fn try_from(value: Vec<String>) -> Result<Self> {
        let mut parts = value.into_iter();
        let program = parts
            .next()
            .filter(|program| !program.trim().is_empty())
            .ok_or_else(|| anyhow!("command must name a program"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl From<CommandSpec> for Vec<String> {
    fn from(value: CommandSpec) -> Self {
        let mut out = Vec::with_capacity(value.args.len() + 1);
        out.push(value.program);
        out.extend(value.args);
        out
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
