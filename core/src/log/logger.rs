use super::LogError;
use log::LevelFilter;
use log4rs::config::Logger;
use std::{collections::BTreeMap, env, str::FromStr};

/// Per-module level filters parsed from an expression such as
/// `info,lotus_consensus=debug,lotus_txscript=trace`.
///
/// A bare level sets the root level, `module=level` sets a module level and a bare module
/// name enables every level for that module. Invalid terms are reported and skipped.
#[derive(Debug, Default, Clone)]
pub(super) struct Filters {
    root_level: Option<LevelFilter>,
    modules: BTreeMap<String, LevelFilter>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_level(mut self, level: LevelFilter) -> Self {
        self.root_level = Some(level);
        self
    }

    /// Applies the expression held in the environment variable `var`, if any.
    pub fn parse_env(self, var: &str) -> Self {
        match env::var(var) {
            Ok(expression) => self.parse_expression(&expression),
            Err(_) => self,
        }
    }

    pub fn parse_expression(mut self, expression: &str) -> Self {
        for term in expression.split(',').map(str::trim).filter(|term| !term.is_empty()) {
            if let Err(err) = self.apply_term(term) {
                eprintln!("Ignoring invalid logging filter: {err}");
            }
        }
        self
    }

    fn apply_term(&mut self, term: &str) -> Result<(), LogError> {
        match term.split_once('=') {
            None => match term.parse::<LevelFilter>() {
                Ok(level) => self.root_level = Some(level),
                Err(_) => {
                    self.modules.insert(term.to_string(), LevelFilter::max());
                }
            },
            Some((module, "")) => {
                self.modules.insert(module.trim().to_string(), LevelFilter::max());
            }
            Some((module, level)) => {
                let level = level.trim().parse::<LevelFilter>().map_err(|_| LogError::ParseFilterError(term.to_string()))?;
                self.modules.insert(module.trim().to_string(), level);
            }
        }
        Ok(())
    }

    pub fn root_level(&self) -> LevelFilter {
        self.root_level.unwrap_or(LevelFilter::Info)
    }

    pub fn module_level(&self, module: &str) -> Option<LevelFilter> {
        self.modules.get(module).copied()
    }

    pub fn loggers(&self, appenders: &[&'static str]) -> Vec<Logger> {
        self.modules
            .iter()
            .map(|(name, level)| Logger::builder().appenders(appenders.iter().map(|x| x.to_string())).additive(false).build(name, *level))
            .collect()
    }
}

impl FromStr for Filters {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new().parse_expression(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_expression() {
        let filters: Filters = "warn, lotus_consensus=debug, lotus_txscript, lotus_utils=".parse().unwrap();
        assert_eq!(filters.root_level(), LevelFilter::Warn);
        assert_eq!(filters.module_level("lotus_consensus"), Some(LevelFilter::Debug));
        assert_eq!(filters.module_level("lotus_txscript"), Some(LevelFilter::Trace));
        assert_eq!(filters.module_level("lotus_utils"), Some(LevelFilter::Trace));
        assert_eq!(filters.module_level("lotus_core"), None);
    }

    #[test]
    fn test_invalid_terms_are_skipped() {
        let filters = Filters::new().with_root_level(LevelFilter::Error).parse_expression("lotus_consensus=loud,info");
        assert_eq!(filters.root_level(), LevelFilter::Info);
        assert_eq!(filters.module_level("lotus_consensus"), None);
    }
}
