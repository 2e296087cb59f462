//! Scenarios: one request, what to expect of its response, and what to keep from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt};

use crate::{
    assertion::Assertion,
    request::{RequestBuilder, RequestDescriptor},
};

/// Execution position. Scenarios run in ascending order; `index` tells apart
/// the scenarios expanded from one parameterized template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Order {
    pub priority: u32,
    pub index: u32,
}

impl Order {
    pub fn new(priority: u32) -> Order {
        Order { priority, index: 0 }
    }
}

impl From<u32> for Order {
    fn from(priority: u32) -> Self {
        Order::new(priority)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.priority, self.index)
    }
}

/// Copy a response field into the run's variables once the scenario succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub path: String,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub order: Order,
    pub name: String,
    pub request: RequestDescriptor,
    pub assertions: Vec<Assertion>,
    pub extract: Vec<ExtractionRule>,
}

/// A scenario whose templates refer to parameter names; see [`crate::expand`].
pub type ScenarioTemplate = Scenario;

impl Scenario {
    pub fn new(
        order: impl Into<Order>,
        name: impl Into<String>,
        request: impl Into<RequestDescriptor>,
    ) -> Scenario {
        Scenario {
            order: order.into(),
            name: name.into(),
            request: request.into(),
            assertions: Vec::new(),
            extract: Vec::new(),
        }
    }

    pub fn expect(mut self, assertion: Assertion) -> Scenario {
        self.assertions.push(assertion);
        self
    }

    pub fn extract(mut self, path: impl Into<String>, variable: impl Into<String>) -> Scenario {
        self.extract.push(ExtractionRule {
            path: path.into(),
            variable: variable.into(),
        });
        self
    }

    /// Every placeholder name in the request and in expected values.
    pub fn placeholder_names(&self) -> Vec<String> {
        let mut names = self.request.placeholder_names();
        for name in self.assertions.iter().flat_map(Assertion::placeholder_names) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub(crate) fn bind<'a, F>(&self, lookup: &F) -> Scenario
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        Scenario {
            order: self.order,
            name: self.name.clone(),
            request: self.request.bind(lookup),
            assertions: self.assertions.iter().map(|a| a.bind(lookup)).collect(),
            extract: self.extract.clone(),
        }
    }
}

impl From<(u32, &str, RequestBuilder)> for Scenario {
    fn from((order, name, request): (u32, &str, RequestBuilder)) -> Self {
        Scenario::new(order, name, request)
    }
}

/// Values extracted during one run, keyed by variable name.
///
/// Created empty by each run and written only by the run that owns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    values: HashMap<String, Value>,
}

impl Variables {
    pub fn new() -> Variables {
        Variables::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Later writes overwrite earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}
