//! Accuracy and power criteria and the handler selection table.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::handler::HandlerType;

/// Requested fix accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyCriterion {
    Fine,
    Medium,
    Coarse,
}

/// Power budget the subscriber accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerCriterion {
    High,
    Low,
}

impl AccuracyCriterion {
    pub const ALL: [AccuracyCriterion; 3] = [Self::Fine, Self::Medium, Self::Coarse];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fine => "fine",
            Self::Medium => "medium",
            Self::Coarse => "coarse",
        }
    }
}

impl PowerCriterion {
    pub const ALL: [PowerCriterion; 2] = [Self::High, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for AccuracyCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PowerCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccuracyCriterion {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(ErrorCode::WrongParameter)
    }
}

impl FromStr for PowerCriterion {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(ErrorCode::WrongParameter)
    }
}

/// Criteria pair → handlers to enable, in priority order.
///
/// | accuracy \ power | high                     | low                  |
/// |------------------|--------------------------|----------------------|
/// | fine             | gps, wifi, cell, hybrid  | wifi, gps, hybrid    |
/// | medium           | wifi, cell, gps, hybrid  | wifi, cell, hybrid   |
/// | coarse           | cell, wifi, hybrid       | hybrid, cell, wifi   |
///
/// Hybrid is the network source, so every pair can still be served when
/// network positioning is the only source loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
    table: HashMap<(AccuracyCriterion, PowerCriterion), Vec<HandlerType>>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        use AccuracyCriterion::*;
        use HandlerType::*;
        use PowerCriterion::*;

        let table = HashMap::from([
            ((Fine, High), vec![Gps, Wifi, Cell, Hybrid]),
            ((Fine, Low), vec![Wifi, Gps, Hybrid]),
            ((Medium, High), vec![Wifi, Cell, Gps, Hybrid]),
            ((Medium, Low), vec![Wifi, Cell, Hybrid]),
            ((Coarse, High), vec![Cell, Wifi, Hybrid]),
            ((Coarse, Low), vec![Hybrid, Cell, Wifi]),
        ]);
        Self { table }
    }
}

impl SelectionPolicy {
    pub fn lookup(&self, accuracy: AccuracyCriterion, power: PowerCriterion) -> &[HandlerType] {
        self.table
            .get(&(accuracy, power))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace the handlers for one criteria pair.
    pub fn set(
        &mut self,
        accuracy: AccuracyCriterion,
        power: PowerCriterion,
        handlers: Vec<HandlerType>,
    ) {
        self.table.insert((accuracy, power), handlers);
    }

    /// Parse a config key such as `fine_high`.
    pub fn parse_key(key: &str) -> Option<(AccuracyCriterion, PowerCriterion)> {
        let (accuracy, power) = key.split_once('_')?;
        Some((accuracy.parse().ok()?, power.parse().ok()?))
    }

    /// Parse a comma-separated handler list such as `gps, wifi`.
    pub fn parse_handlers(value: &str) -> Result<Vec<HandlerType>, ErrorCode> {
        let handlers = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<HandlerType>, _>>()?;

        if handlers.is_empty() || handlers.contains(&HandlerType::Lbs) {
            return Err(ErrorCode::WrongParameter);
        }
        Ok(handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = SelectionPolicy::default();
        assert_eq!(
            policy.lookup(AccuracyCriterion::Fine, PowerCriterion::High),
            &[
                HandlerType::Gps,
                HandlerType::Wifi,
                HandlerType::Cell,
                HandlerType::Hybrid
            ]
        );
        assert_eq!(
            policy.lookup(AccuracyCriterion::Coarse, PowerCriterion::Low),
            &[HandlerType::Hybrid, HandlerType::Cell, HandlerType::Wifi]
        );
        for accuracy in AccuracyCriterion::ALL {
            for power in PowerCriterion::ALL {
                assert!(policy.lookup(accuracy, power).contains(&HandlerType::Hybrid));
            }
        }
    }

    #[test]
    fn test_override() {
        let mut policy = SelectionPolicy::default();
        policy.set(
            AccuracyCriterion::Fine,
            PowerCriterion::Low,
            vec![HandlerType::Hybrid],
        );
        assert_eq!(
            policy.lookup(AccuracyCriterion::Fine, PowerCriterion::Low),
            &[HandlerType::Hybrid]
        );
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(
            SelectionPolicy::parse_key("medium_low"),
            Some((AccuracyCriterion::Medium, PowerCriterion::Low))
        );
        assert_eq!(SelectionPolicy::parse_key("medium"), None);
        assert_eq!(SelectionPolicy::parse_key("ultra_low"), None);
    }

    #[test]
    fn test_parse_handlers() {
        assert_eq!(
            SelectionPolicy::parse_handlers(" gps,wifi , cell"),
            Ok(vec![HandlerType::Gps, HandlerType::Wifi, HandlerType::Cell])
        );
        assert_eq!(
            SelectionPolicy::parse_handlers("gps, radar"),
            Err(ErrorCode::WrongParameter)
        );
        assert_eq!(SelectionPolicy::parse_handlers(""), Err(ErrorCode::WrongParameter));
        assert_eq!(SelectionPolicy::parse_handlers("lbs"), Err(ErrorCode::WrongParameter));
    }

    #[test]
    fn test_criterion_parsing() {
        assert_eq!("FINE".parse::<AccuracyCriterion>(), Ok(AccuracyCriterion::Fine));
        assert_eq!(" low ".parse::<PowerCriterion>(), Ok(PowerCriterion::Low));
        assert_eq!("max".parse::<PowerCriterion>(), Err(ErrorCode::WrongParameter));
    }
}
