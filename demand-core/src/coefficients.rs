// This file is part of Demand-Core.
// Copyright © 2022, 2023, 2024, 2025 André de Palma, Lucas Javaudin
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Tables of estimated coefficients.
use anyhow::{bail, Result};
use hashbrown::HashMap;

use crate::error::ConfigurationError;

/// Coefficients of a choice model: for each alternative, a map variable name -> value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoefficientTable {
    name: String,
    values: HashMap<String, HashMap<String, f64>>,
}

impl CoefficientTable {
    /// Creates an empty table with the given name (used in error messages).
    pub fn new(name: impl Into<String>) -> Self {
        CoefficientTable {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    /// Creates a table from rows of coefficients.
    ///
    /// Each row is a variable name and its coefficients, one per alternative, in the order of
    /// `alternatives`.
    pub fn from_rows(
        name: impl Into<String>,
        alternatives: &[String],
        rows: Vec<(String, Vec<f64>)>,
    ) -> Result<Self> {
        let mut table = Self::new(name);
        for alternative in alternatives {
            if table.values.contains_key(alternative.as_str()) {
                bail!(
                    "Alternative `{alternative}` is defined twice in table `{}`",
                    table.name
                );
            }
            table.values.insert(alternative.clone(), HashMap::new());
        }
        for (variable, coefs) in rows {
            if coefs.len() != alternatives.len() {
                bail!(
                    "Variable `{variable}` of table `{}` has {} values but there are {} alternatives",
                    table.name,
                    coefs.len(),
                    alternatives.len()
                );
            }
            for (alternative, value) in alternatives.iter().zip(coefs) {
                table.insert(alternative, &variable, value)?;
            }
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the coefficient of a variable for an alternative.
    ///
    /// Returns an error if the value is not finite.
    pub fn insert(
        &mut self,
        alternative: &str,
        variable: &str,
        value: f64,
    ) -> Result<(), ConfigurationError> {
        if !value.is_finite() {
            return Err(ConfigurationError::InvalidCoefficient {
                table: self.name.clone(),
                alternative: alternative.to_owned(),
                variable: variable.to_owned(),
                value,
            });
        }
        self.values
            .entry(alternative.to_owned())
            .or_default()
            .insert(variable.to_owned(), value);
        Ok(())
    }

    pub fn has_alternative(&self, alternative: &str) -> bool {
        self.values.contains_key(alternative)
    }

    /// Returns the alternatives of the table, in alphabetical order.
    pub fn alternatives(&self) -> Vec<&str> {
        let mut alts: Vec<&str> = self.values.keys().map(String::as_str).collect();
        alts.sort_unstable();
        alts
    }

    /// Returns all the coefficients of an alternative.
    pub fn coefficients(
        &self,
        alternative: &str,
    ) -> Result<&HashMap<String, f64>, ConfigurationError> {
        self.values
            .get(alternative)
            .ok_or_else(|| ConfigurationError::MissingAlternative {
                table: self.name.clone(),
                alternative: alternative.to_owned(),
            })
    }

    /// Returns the coefficient of a variable for an alternative.
    ///
    /// A missing coefficient is an error.
    pub fn get(&self, alternative: &str, variable: &str) -> Result<f64, ConfigurationError> {
        self.coefficients(alternative)?
            .get(variable)
            .copied()
            .ok_or_else(|| ConfigurationError::MissingCoefficient {
                table: self.name.clone(),
                alternative: alternative.to_owned(),
                variable: variable.to_owned(),
            })
    }

    /// Returns the coefficient of an optional variable, 0 if it is not defined.
    ///
    /// The alternative itself must exist.
    pub fn get_or_zero(&self, alternative: &str, variable: &str) -> Result<f64, ConfigurationError> {
        Ok(self
            .coefficients(alternative)?
            .get(variable)
            .copied()
            .unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CoefficientTable {
        CoefficientTable::from_rows(
            "mode_choice_hbw",
            &["Walk".to_owned(), "Bicycle".to_owned()],
            vec![
                ("intercept".to_owned(), vec![1.0, -0.5]),
                ("hh_size".to_owned(), vec![0.1, 0.2]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn get_test() {
        let table = table();
        assert_eq!(table.get("Walk", "intercept").unwrap(), 1.0);
        assert_eq!(table.get("Bicycle", "hh_size").unwrap(), 0.2);
        assert_eq!(table.alternatives(), vec!["Bicycle", "Walk"]);
        assert_eq!(
            table.get("Walk", "p_female"),
            Err(ConfigurationError::MissingCoefficient {
                table: "mode_choice_hbw".to_owned(),
                alternative: "Walk".to_owned(),
                variable: "p_female".to_owned(),
            })
        );
        assert_eq!(table.get_or_zero("Walk", "p_female").unwrap(), 0.0);
        assert!(matches!(
            table.get_or_zero("Car", "intercept"),
            Err(ConfigurationError::MissingAlternative { .. })
        ));
    }

    #[test]
    fn invalid_table_test() {
        let alts = ["Walk".to_owned()];
        assert!(
            CoefficientTable::from_rows("t", &alts, vec![("x".to_owned(), vec![f64::NAN])])
                .is_err()
        );
        assert!(
            CoefficientTable::from_rows("t", &alts, vec![("x".to_owned(), vec![1.0, 2.0])])
                .is_err()
        );
        assert!(CoefficientTable::from_rows(
            "t",
            &["Walk".to_owned(), "Walk".to_owned()],
            vec![]
        )
        .is_err());
    }
}
