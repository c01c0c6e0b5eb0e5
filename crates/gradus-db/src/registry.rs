use gradus_common::{Defect, Error, Phase, Result};

use crate::step::Step;

/// Ordered list of declared migration steps.
#[derive(Debug, Default)]
pub struct Registry {
    steps: Vec<Step>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(Step::name)
    }

    /// Check that names strictly increase and every step declares both
    /// actions. Stops at the first offending step.
    pub fn validate(&self) -> Result<()> {
        let mut previous: Option<&str> = None;
        for step in &self.steps {
            if previous.is_some_and(|prev| step.name() <= prev) {
                return Err(defect(step, Defect::BadlyOrdered));
            }
            previous = Some(step.name());

            if step.action(Phase::Apply).is_none() {
                return Err(defect(step, Defect::MissingApply));
            }
            if step.action(Phase::Revert).is_none() {
                return Err(defect(step, Defect::MissingRevert));
            }
        }
        Ok(())
    }
}

impl FromIterator<Step> for Registry {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

fn defect(step: &Step, defect: Defect) -> Error {
    Error::Definition {
        name: step.name().to_string(),
        defect,
    }
}
