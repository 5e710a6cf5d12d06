use serde_yaml::Value;

use crate::error::ConfigError;

/// Hyperparameters that may be given as a schedule.
pub const SCHEDULE_KEYS: [&str; 2] = ["learning_rate", "cliprange"];

/// A hyperparameter as a function of training progress, where progress is
/// the remaining fraction of training: 1.0 at the start, 0.0 at the end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    Constant(f64),
    /// Decays linearly from `initial` (progress 1) to zero (progress 0).
    Linear { initial: f64 },
}

impl Schedule {
    /// Parse a YAML value: a number becomes a constant schedule, a string of
    /// the form `"<kind>_<initial>"` a decaying one.
    pub fn parse(key: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(Schedule::Constant)
                .ok_or_else(|| invalid(key, &n.to_string())),
            Value::String(s) => Self::parse_str(key, s),
            // `!!float 3e-4` may arrive as a tagged string.
            Value::Tagged(tagged) => match &tagged.value {
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(Schedule::Constant)
                    .or_else(|_| Self::parse_str(key, s)),
                inner => Self::parse(key, inner),
            },
            other => Err(invalid(key, &format!("{other:?}"))),
        }
    }

    fn parse_str(key: &str, s: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = s.split('_').collect();
        let [kind, initial] = parts.as_slice() else {
            return Err(invalid(key, s));
        };
        let initial: f64 = initial.parse().map_err(|_| invalid(key, s))?;
        match *kind {
            "linear" => Ok(Schedule::Linear { initial }),
            _ => Err(invalid(key, s)),
        }
    }

    pub fn value(&self, progress: f64) -> f64 {
        match *self {
            Schedule::Constant(v) => v,
            Schedule::Linear { initial } => progress * initial,
        }
    }

    pub fn initial_value(&self) -> f64 {
        self.value(1.0)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidSchedule {
        key: key.to_string(),
        value: value.to_string(),
    }
}
