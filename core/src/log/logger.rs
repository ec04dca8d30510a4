use log::LevelFilter;
use log4rs::config::Logger;
use std::{collections::BTreeMap, str::FromStr};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LogError {
    #[error("invalid logger directive '{0}'")]
    InvalidDirective(String),

    #[error("failed to initialize logger: {0}")]
    Init(String),
}

/// A parsed `RUST_LOG`-like filter expression, e.g. `info,weave_consensus::pipeline=debug`.
///
/// A bare level sets the root level, `target=level` adds a per-target logger and a bare target
/// enables everything for it. Invalid directives are reported and skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterSpec {
    root_level: LevelFilter,
    targets: BTreeMap<String, LevelFilter>,
}

impl FilterSpec {
    pub fn parse(expression: &str) -> (Self, Vec<LogError>) {
        let mut spec = Self { root_level: LevelFilter::Error, targets: BTreeMap::new() };
        let mut errors = Vec::new();
        for directive in expression.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let mut parts = directive.split('=').map(str::trim);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(single), None, None) => match single.parse() {
                    Ok(level) => spec.root_level = level,
                    Err(_) => {
                        spec.targets.insert(single.to_owned(), LevelFilter::max());
                    }
                },
                (Some(target), Some(""), None) => {
                    spec.targets.insert(target.to_owned(), LevelFilter::max());
                }
                (Some(target), Some(level), None) => match level.parse() {
                    Ok(level) => {
                        spec.targets.insert(target.to_owned(), level);
                    }
                    Err(_) => errors.push(LogError::InvalidDirective(directive.to_owned())),
                },
                _ => errors.push(LogError::InvalidDirective(directive.to_owned())),
            }
        }
        (spec, errors)
    }

    pub fn root_level(&self) -> LevelFilter {
        self.root_level
    }

    pub fn target_level(&self, target: &str) -> Option<LevelFilter> {
        self.targets.get(target).copied()
    }

    pub(super) fn loggers<'a>(&'a self, appenders: &'a [&'static str]) -> impl Iterator<Item = Logger> + 'a {
        self.targets.iter().map(move |(target, level)| {
            Logger::builder().appenders(appenders.iter().map(|a| a.to_string())).additive(false).build(target.clone(), *level)
        })
    }
}

impl FromStr for FilterSpec {
    type Err = LogError;

    /// Strict parsing: any invalid directive fails the whole expression
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (spec, mut errors) = Self::parse(s);
        match errors.pop() {
            Some(err) => Err(err),
            None => Ok(spec),
        }
    }
}
