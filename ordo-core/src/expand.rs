//! Parameterized scenarios.
//!
//! [`expand`] turns one template plus a table of literal rows into one
//! concrete scenario per row, ahead of execution. Expansion is pure: the same
//! template and rows always produce equal scenarios.

use itertools::Itertools;
use serde_json::Value;
use std::collections::HashMap;

use crate::{
    error::{ConfigError, Result},
    scenario::{Order, Scenario, ScenarioTemplate},
    template,
};

/// Named parameters and the rows bound to them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet {
    names: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ParameterSet {
    /// A table of tuples, one value per name in each row.
    pub fn rows<N, R, V>(names: N, rows: R) -> ParameterSet
    where
        N: IntoIterator,
        N::Item: Into<String>,
        R: IntoIterator,
        R::Item: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ParameterSet {
            names: names.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// An enumerated value set bound to a single parameter.
    pub fn values<V: Into<Value>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> ParameterSet {
        ParameterSet {
            names: vec![name.into()],
            rows: values.into_iter().map(|v| vec![v.into()]).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn validate(&self, template: &str) -> std::result::Result<(), ConfigError> {
        if let Some(dup) = self.names.iter().duplicates().next() {
            return Err(ConfigError::DuplicateParameter(dup.clone()));
        }
        for (row, values) in self.rows.iter().enumerate() {
            if values.len() != self.names.len() {
                return Err(ConfigError::ParameterArity {
                    template: template.to_string(),
                    row,
                    expected: self.names.len(),
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }
}

/// Row values joined into a name suffix: `("Brud", 1)` becomes `brud_1`.
fn row_suffix(row: &[Value]) -> String {
    row.iter()
        .map(|v| {
            template::to_text(v)
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect::<String>()
                .to_lowercase()
        })
        .join("_")
}

/// One scenario per row of `params`, in row order.
///
/// Row `i` gets order `(template.order.priority, i)` and the name
/// `"{template.name}::{row values}"`. Two rows with the same name are a
/// configuration error. Placeholders that are not parameters are left for
/// run-time binding.
pub fn expand(template: &ScenarioTemplate, params: &ParameterSet) -> Result<Vec<Scenario>> {
    params.validate(&template.name)?;

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut scenarios = Vec::with_capacity(params.rows.len());
    for (i, row) in params.rows.iter().enumerate() {
        let index = u32::try_from(i).map_err(|_| ConfigError::TooManyRows {
            template: template.name.clone(),
        })?;
        let name = format!("{}::{}", template.name, row_suffix(row));
        if let Some(&first) = seen.get(&name) {
            return Err(ConfigError::DuplicateExpansion {
                template: template.name.clone(),
                name,
                first,
                second: i,
            }
            .into());
        }
        seen.insert(name.clone(), i);

        let bindings: HashMap<&str, &Value> = params
            .names
            .iter()
            .map(String::as_str)
            .zip(row.iter())
            .collect();
        let lookup = |name: &str| bindings.get(name).copied();

        let mut scenario = template.bind(&lookup);
        scenario.order = Order {
            priority: template.order.priority,
            index,
        };
        scenario.name = name;
        scenarios.push(scenario);
    }

    Ok(scenarios)
}
