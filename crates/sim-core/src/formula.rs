//! Derived Numeric Effects
//!
//! Small closed expression language for configurable effects such as
//! passive regeneration. Formulas are plain data loaded from TOML and
//! evaluated against an agent's [`StatBlock`].

use serde::{Deserialize, Serialize};

/// Agent statistics a formula may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Hp,
    MaxHp,
    Level,
    AgeYears,
    Stones,
}

/// Snapshot of the stats of one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatBlock {
    pub hp: f64,
    pub max_hp: f64,
    pub level: f64,
    pub age_years: f64,
    pub stones: f64,
}

impl StatBlock {
    pub fn get(&self, stat: Stat) -> f64 {
        match stat {
            Stat::Hp => self.hp,
            Stat::MaxHp => self.max_hp,
            Stat::Level => self.level,
            Stat::AgeYears => self.age_years,
            Stat::Stones => self.stones,
        }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    Const { value: f64 },
    Stat { stat: Stat },
    Add { terms: Vec<Formula> },
    Mul { factors: Vec<Formula> },
    Min { a: Box<Formula>, b: Box<Formula> },
    Max { a: Box<Formula>, b: Box<Formula> },
    Clamp { value: Box<Formula>, lo: f64, hi: f64 },
}

impl Formula {
    pub fn constant(value: f64) -> Self {
        Formula::Const { value }
    }

    pub fn stat(stat: Stat) -> Self {
        Formula::Stat { stat }
    }

    pub fn eval(&self, stats: &StatBlock) -> f64 {
        match self {
            Formula::Const { value } => *value,
            Formula::Stat { stat } => stats.get(*stat),
            Formula::Add { terms } => terms.iter().map(|t| t.eval(stats)).sum(),
            Formula::Mul { factors } => factors.iter().map(|f| f.eval(stats)).product(),
            Formula::Min { a, b } => a.eval(stats).min(b.eval(stats)),
            Formula::Max { a, b } => a.eval(stats).max(b.eval(stats)),
            Formula::Clamp { value, lo, hi } => value.eval(stats).clamp(*lo, hi.max(*lo)),
        }
    }

    /// Default passive regeneration: `clamp(2 + level / 2, 0, max_hp - hp)`.
    pub fn default_regen() -> Self {
        let base = Formula::Add {
            terms: vec![
                Formula::constant(2.0),
                Formula::Mul {
                    factors: vec![Formula::stat(Stat::Level), Formula::constant(0.5)],
                },
            ],
        };
        let missing = Formula::Add {
            terms: vec![
                Formula::stat(Stat::MaxHp),
                Formula::Mul {
                    factors: vec![Formula::stat(Stat::Hp), Formula::constant(-1.0)],
                },
            ],
        };
        Formula::Max {
            a: Box::new(Formula::Min {
                a: Box::new(base),
                b: Box::new(missing),
            }),
            b: Box::new(Formula::constant(0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(hp: f64, max_hp: f64, level: f64) -> StatBlock {
        StatBlock {
            hp,
            max_hp,
            level,
            ..StatBlock::default()
        }
    }

    #[test]
    fn test_default_regen_caps_at_missing_hp() {
        let regen = Formula::default_regen();
        assert_eq!(regen.eval(&stats(50.0, 100.0, 4.0)), 4.0);
        assert_eq!(regen.eval(&stats(99.0, 100.0, 4.0)), 1.0);
        assert_eq!(regen.eval(&stats(100.0, 100.0, 4.0)), 0.0);
        assert_eq!(regen.eval(&stats(120.0, 100.0, 4.0)), 0.0);
    }

    #[test]
    fn test_clamp_and_empty_terms() {
        let f = Formula::Clamp {
            value: Box::new(Formula::stat(Stat::Stones)),
            lo: 0.0,
            hi: 10.0,
        };
        let block = StatBlock {
            stones: 25.0,
            ..StatBlock::default()
        };
        assert_eq!(f.eval(&block), 10.0);
        assert_eq!(Formula::Add { terms: vec![] }.eval(&block), 0.0);
        assert_eq!(Formula::Mul { factors: vec![] }.eval(&block), 1.0);
    }

    #[test]
    fn test_parse_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            regen: Formula,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [regen]
            op = "add"
            terms = [
                { op = "const", value = 1.0 },
                { op = "stat", stat = "level" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.regen.eval(&stats(0.0, 0.0, 3.0)), 4.0);
    }
}
