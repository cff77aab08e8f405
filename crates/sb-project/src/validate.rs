//! Sweep configuration validation.

use crate::schema::SweepConfig;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Missing entries: {field} must not be empty")]
    Empty { field: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

pub fn validate_config(config: &SweepConfig) -> Result<(), ValidationError> {
    positive("max_threads", u64::from(config.max_threads))?;
    positive("thread_step", u64::from(config.thread_step))?;
    positive("particles_per_thread", config.particles_per_thread)?;
    positive("n_repeats", u64::from(config.n_repeats))?;
    positive("energy_groups", config.energy_groups as u64)?;

    if config.models.is_empty() {
        return Err(ValidationError::Empty {
            field: "models".to_string(),
        });
    }
    if config.executables.is_empty() {
        return Err(ValidationError::Empty {
            field: "executables".to_string(),
        });
    }

    for (name, path) in &config.models {
        if name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "models key".to_string(),
            });
        }
        if path.as_os_str().is_empty() {
            return Err(ValidationError::Empty {
                field: format!("models.{name}"),
            });
        }
    }

    for (name, exe) in &config.executables {
        if name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "executables key".to_string(),
            });
        }
        if exe.command().trim().is_empty() {
            return Err(ValidationError::Empty {
                field: format!("executables.{name}.command"),
            });
        }
    }

    for (name, cap) in &config.thread_caps {
        if !config.executables.contains_key(name) {
            return Err(ValidationError::MissingReference {
                id: name.clone(),
                context: "thread_caps".to_string(),
            });
        }
        positive(&format!("thread_caps.{name}"), u64::from(*cap))?;
    }

    let batches = &config.batches;
    positive("batches.eigenvalue", u64::from(batches.eigenvalue))?;
    positive("batches.fixed_source", u64::from(batches.fixed_source))?;
    if batches.eigenvalue_inactive >= batches.eigenvalue {
        return Err(ValidationError::InvalidValue {
            field: "batches.eigenvalue_inactive".to_string(),
            value: batches.eigenvalue_inactive.to_string(),
            reason: format!(
                "must be smaller than batches.eigenvalue ({})",
                batches.eigenvalue
            ),
        });
    }

    Ok(())
}

fn positive(field: &str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SweepConfig {
        serde_yaml::from_str(
            "models:\n  m1: inputs/m1\nexecutables:\n  moab: openmc\n",
        )
        .unwrap()
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn zero_step_is_rejected() {
        let mut cfg = config();
        cfg.thread_step = 0;
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "thread_step"));
    }

    #[test]
    fn cap_for_unknown_executable_is_rejected() {
        let mut cfg = config();
        cfg.thread_caps.insert("dagmc".to_string(), 8);
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::MissingReference { ref id, .. } if id == "dagmc"));
    }

    #[test]
    fn empty_models_are_rejected() {
        let mut cfg = config();
        cfg.models.clear();
        assert!(matches!(
            validate_config(&cfg),
            Err(ValidationError::Empty { .. })
        ));
    }

    #[test]
    fn inactive_batches_must_leave_active_ones() {
        let mut cfg = config();
        cfg.batches.eigenvalue_inactive = cfg.batches.eigenvalue;
        assert!(validate_config(&cfg).is_err());
    }
}
