use fail::FailScenario;

/// Fail points configured for the lifetime of a test.
///
/// Every configured fail point is turned off again on drop, so a later run in the same test sees
/// the unmodified code path.
pub struct FailpointScenario<'a> {
    _scenario: FailScenario<'a>,
    names: Vec<String>,
}

impl<'a> FailpointScenario<'a> {
    /// Configures each `(name, action)` pair, e.g. `("snapshot_load.before_marker", "return")`.
    pub fn setup(failpoints: &[(&str, &str)]) -> FailpointScenario<'a> {
        let scenario = FailScenario::setup();
        for (name, action) in failpoints {
            fail::cfg(*name, action).unwrap();
        }

        Self {
            _scenario: scenario,
            names: failpoints.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }

    /// Turns every fail point of the scenario off while keeping the scenario alive.
    pub fn disable_all(&self) {
        for name in &self.names {
            fail::cfg(name, "off").unwrap();
        }
    }
}

impl Drop for FailpointScenario<'_> {
    fn drop(&mut self) {
        self.disable_all();
    }
}
