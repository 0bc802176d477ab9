use manyview_proto::SimDataPayload;
use std::collections::{HashMap, VecDeque};

/// Samples retained per variable.
pub const SAMPLE_HISTORY: usize = 5;

/// Rolling window over one sampled variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarSeries {
    samples: VecDeque<f64>,
    /// Change per kernel cycle between the last two samples.
    pub rate: f64,
    /// Whether the last sample differed from the one before it.
    pub active: bool,
}

impl VarSeries {
    /// Appends one sample. `cycle_delta` is the kernel-cycle distance to the
    /// previous batch; a zero distance yields a zero rate rather than a
    /// division blowup, and deltas below one cycle are clamped to one.
    pub fn record(&mut self, value: f64, cycle_delta: f64) {
        match self.samples.back().copied() {
            None => {
                self.rate = 0.0;
                self.active = false;
            }
            Some(last) => {
                self.active = value != last;
                self.rate = if cycle_delta == 0.0 {
                    0.0
                } else {
                    (value - last) / cycle_delta.max(1.0)
                };
            }
        }
        self.samples.push_back(value);
        if self.samples.len() > SAMPLE_HISTORY {
            self.samples.pop_front();
        }
    }

    /// Most recent samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }
}

/// All variables sampled under one hardware component.
#[derive(Debug, Clone, Default)]
pub struct ComponentSeries {
    pub vars: HashMap<String, VarSeries>,
}

impl ComponentSeries {
    /// Fraction of this component's variables that changed in the latest
    /// batch. Drives the component's activity shading.
    pub fn active_ratio(&self) -> f64 {
        if self.vars.is_empty() {
            return 0.0;
        }
        let active = self.vars.values().filter(|series| series.active).count();
        active as f64 / self.vars.len() as f64
    }
}

/// Telemetry series keyed by component, rebuilt whenever the backend
/// acknowledges a new sampling selection.
#[derive(Debug, Clone, Default)]
pub struct TelemetryMap {
    components: HashMap<String, ComponentSeries>,
}

impl TelemetryMap {
    /// Splits a variable path into its component and the key the series is
    /// stored under. A path with no separator uses the component name itself
    /// as key.
    fn split_path(path: &str) -> (&str, &str) {
        match path.split_once(':') {
            Some((component, rest)) => (component, rest),
            None => (path, path),
        }
    }

    /// Drops all series and registers one empty series per selected path.
    pub fn rebuild_from_selection(&mut self, vars: &[String]) {
        self.components.clear();
        for path in vars {
            let (component, key) = Self::split_path(path);
            self.components
                .entry(component.to_string())
                .or_default()
                .vars
                .insert(key.to_string(), VarSeries::default());
        }
    }

    /// Records one sample. Paths naming an unregistered component or
    /// variable refer to nothing we track and are ignored.
    pub fn record(&mut self, path: &str, value: f64, cycle_delta: f64) -> bool {
        let (component, key) = Self::split_path(path);
        let Some(series) = self
            .components
            .get_mut(component)
            .and_then(|component| component.vars.get_mut(key))
        else {
            return false;
        };
        series.record(value, cycle_delta);
        true
    }

    /// Applies one `sim_data` batch. The kernel cycle counter is bookkeeping,
    /// not a sampled variable, so it is skipped. Returns how many samples
    /// landed in a registered series.
    pub fn apply_batch(&mut self, data: &HashMap<String, f64>, cycle_delta: f64) -> usize {
        let mut applied = 0;
        for (path, value) in data {
            if path == SimDataPayload::KERNEL_CYCLE {
                continue;
            }
            if self.record(path, *value, cycle_delta) {
                applied += 1;
            }
        }
        applied
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSeries> {
        self.components.get(name)
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}
