use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf};

use crate::{RegressionErr, Result};

pub const USAGE: &str = "\
usage:
  least-squares local <dataset> <workers>
  least-squares node <rank> <dataset> <addr0> <addr1> ...

environment:
  LSQ_RESIDUALS  0, false or off to skip the residual table
  LSQ_FORMAT     text (default) or json
  RUST_LOG       log filter";

/// How the workers of a run are hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Every worker is a task of this process.
    Local { workers: NonZeroUsize },
    /// This process is the worker `rank` of a TCP mesh over `peers`.
    Node { rank: usize, peers: Vec<SocketAddr> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Json,
}

/// Immutable settings of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub mode: Mode,
    pub dataset: PathBuf,
    pub residuals: bool,
    pub format: Format,
}

impl RunConfig {
    /// Parses the command line and environment.
    ///
    /// # Args
    /// * `args` - The arguments after the program name.
    /// * `env` - Lookup of environment variables.
    ///
    /// # Errors
    /// `InvalidConfig` naming the offending argument or variable.
    pub fn parse<I, S, F>(args: I, env: F) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&str) -> Option<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let (mode, dataset) = match args.first().map(String::as_str) {
            Some("local") => parse_local(&args[1..])?,
            Some("node") => parse_node(&args[1..])?,
            Some(other) => return Err(invalid(format!("unknown mode {other:?}"))),
            None => return Err(invalid("missing mode")),
        };

        let residuals = match env("LSQ_RESIDUALS") {
            None => true,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" => false,
                "1" | "true" | "on" | "" => true,
                _ => return Err(invalid(format!("LSQ_RESIDUALS has an invalid value {v:?}"))),
            },
        };

        let format = match env("LSQ_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => Format::Text,
            Some("json") => Format::Json,
            Some(other) => {
                return Err(invalid(format!("LSQ_FORMAT has an invalid value {other:?}")));
            }
        };

        Ok(Self {
            mode,
            dataset,
            residuals,
            format,
        })
    }

    /// The amount of workers of the run.
    pub fn workers(&self) -> usize {
        match &self.mode {
            Mode::Local { workers } => workers.get(),
            Mode::Node { peers, .. } => peers.len(),
        }
    }
}

fn parse_local(args: &[String]) -> Result<(Mode, PathBuf)> {
    let [dataset, workers] = args else {
        return Err(invalid("local mode takes <dataset> <workers>"));
    };

    let workers = workers
        .parse::<NonZeroUsize>()
        .map_err(|_| invalid(format!("workers must be a positive integer, got {workers:?}")))?;

    Ok((Mode::Local { workers }, PathBuf::from(dataset)))
}

fn parse_node(args: &[String]) -> Result<(Mode, PathBuf)> {
    let [rank, dataset, addrs @ ..] = args else {
        return Err(invalid("node mode takes <rank> <dataset> <addr0> ..."));
    };

    let rank = rank
        .parse::<usize>()
        .map_err(|_| invalid(format!("rank must be a non negative integer, got {rank:?}")))?;

    let peers = addrs
        .iter()
        .map(|addr| {
            addr.parse::<SocketAddr>()
                .map_err(|_| invalid(format!("invalid peer address {addr:?}")))
        })
        .collect::<Result<Vec<_>>>()?;

    if rank >= peers.len() {
        return Err(invalid(format!(
            "rank {rank} needs at least {} peer address(es), got {}",
            rank + 1,
            peers.len()
        )));
    }

    Ok((Mode::Node { rank, peers }, PathBuf::from(dataset)))
}

fn invalid(msg: impl Into<String>) -> RegressionErr {
    RegressionErr::InvalidConfig(msg.into())
}
