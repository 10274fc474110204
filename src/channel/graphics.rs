//! Labelled numeric series for the companion's plot view.
//!
//! A plot must be configured with `setup` before values are sent. Each
//! `plot` call emits one frame:
//!
//! ```text
//! <plot>:<label1>:<value1>:<label2>:<value2>...
//! ```
//!
//! A value count that differs from the label count produces no output.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use super::{Channel, ChannelCore};
use crate::error::SendError;
use crate::link::registry::ChannelKind;
use crate::link::session::Gate;
use crate::protocol::{HIDE, PRIMARY_DELIMITER, SHOW};

#[derive(Debug, Clone, Default)]
struct PlotSpec {
    axes: Vec<String>,
    labels: Vec<String>,
}

pub struct Graphics {
    core: ChannelCore,
    plots: Mutex<BTreeMap<String, PlotSpec>>,
}

impl Graphics {
    pub fn new(name: &str) -> Self {
        Self {
            core: ChannelCore::new(name),
            plots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register (or replace) a plot's axis and series labels.
    pub fn setup(&self, plot: &str, axes: &[&str], labels: &[&str]) {
        let spec = PlotSpec {
            axes: axes.iter().map(|s| (*s).to_owned()).collect(),
            labels: labels.iter().map(|s| (*s).to_owned()).collect(),
        };
        self.plots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plot.to_owned(), spec);
    }

    pub fn axes(&self, plot: &str) -> Option<Vec<String>> {
        self.plots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plot)
            .map(|spec| spec.axes.clone())
    }

    /// Send one sample per series label.
    pub fn plot(&self, plot: &str, values: &[f32]) -> Result<(), SendError> {
        let line = {
            let plots = self.plots.lock().unwrap_or_else(PoisonError::into_inner);
            let spec = plots.get(plot).ok_or(SendError::UnknownPlot)?;
            if spec.labels.len() != values.len() {
                return Err(SendError::LabelMismatch);
            }
            let mut line = String::from(plot);
            for (label, value) in spec.labels.iter().zip(values) {
                line.push(PRIMARY_DELIMITER);
                line.push_str(label);
                line.push(PRIMARY_DELIMITER);
                line.push_str(&value.to_string());
            }
            line
        };
        self.core.emit(false, &line, Gate::Uplink)
    }

    pub fn hide(&self) -> Result<(), SendError> {
        self.core.emit(true, HIDE, Gate::Uplink)
    }

    pub fn show(&self) -> Result<(), SendError> {
        self.core.emit(true, SHOW, Gate::Uplink)
    }
}

impl Channel for Graphics {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Graphics
    }

    fn deliver(&self, payload: Vec<u8>) {
        let _ = self.core.answer_name_query(&payload);
    }
}
