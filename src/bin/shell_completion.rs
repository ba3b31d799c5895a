mod opt_merge;

use std::{
    env::var_os,
    io::{stdout, Write},
    path::Path,
};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::{generate, shells::*, Generator};
use strum::{Display, EnumString};

#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    EnumString,
    ValueEnum,
)]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "lowercase")]
enum Shell {
    Bash,
    Elvish,
    Fish,
    #[allow(clippy::enum_variant_names)]
    PowerShell,
    Zsh,
}

#[derive(Debug, Parser)]
struct ShellSelect {
    /// Shell for which to generate completions
    ///
    /// If omitted, use the shell from the `SHELL` environment variable
    #[clap(value_enum)]
    shell: Option<Shell>,
}

fn gen_completion<S: Copy + Generator, W: Write>(shell: S, mut to: W) {
    generate(
        shell,
        &mut crate::opt_merge::Opt::command(),
        "gammajet-merge",
        &mut to,
    );
}

fn main() -> Result<()> {
    let shell = ShellSelect::parse()
        .shell
        .map_or_else(shell_from_env, Ok)
        .context("Failed to determine shell")?;
    eprintln!("Generating {shell} completions");
    let out = stdout();
    match shell {
        Shell::Bash => gen_completion(Bash, out),
        Shell::Elvish => gen_completion(Elvish, out),
        Shell::Fish => gen_completion(Fish, out),
        Shell::PowerShell => gen_completion(PowerShell, out),
        Shell::Zsh => gen_completion(Zsh, out),
    }
    Ok(())
}

fn shell_from_env() -> Result<Shell> {
    let shell = var_os("SHELL").context("SHELL is not set")?;
    let name = Path::new(&shell)
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Cannot extract shell name from {shell:?}"))?;
    name.parse()
        .with_context(|| format!("{name} is not a supported shell"))
}
