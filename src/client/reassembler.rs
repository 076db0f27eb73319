//! Reassembly of chunked outbound values.

use serde_json::Value;

use crate::models::message::{InboundCommand, OutboundKind, OutboundMessage};

/// Prefix of every plot image source.
pub const PLOT_URI_PREFIX: &str = "data:image/png;base64,";

/// One transcript line or chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// `Stdout` or `Stderr`; stderr is rendered distinctly.
    pub stream: OutboundKind,
    /// Text as received.
    pub text: String,
}

/// A plot image, growing until its terminator arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotImage {
    /// Data URI built from [`PLOT_URI_PREFIX`] and the base64 fragments.
    pub src: String,
    /// Whether the terminator has been seen.
    pub complete: bool,
}

/// Tabular rendering of a data frame snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataTable {
    /// Column names, from the first row's keys in document order.
    pub columns: Vec<String>,
    /// Cell text per row, aligned with `columns`.
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Build a table from a JSON array of row objects.
    ///
    /// # Errors
    ///
    /// Returns a description of the first structural problem.
    pub fn from_records(value: &Value) -> std::result::Result<Self, String> {
        let records = value
            .as_array()
            .ok_or_else(|| "expected an array of row records".to_owned())?;

        let columns: Vec<String> = match records.first() {
            None => Vec::new(),
            Some(Value::Object(first)) => first.keys().cloned().collect(),
            Some(_) => return Err("row records must be objects".into()),
        };

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let Value::Object(fields) = record else {
                return Err("row records must be objects".into());
            };
            rows.push(
                columns
                    .iter()
                    .map(|column| fields.get(column).map_or_else(String::new, cell_text))
                    .collect(),
            );
        }

        Ok(Self { columns, rows })
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NA".into(),
        other => other.to_string(),
    }
}

/// Result of applying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientUpdate {
    /// A transcript entry was appended.
    Transcript,
    /// A new plot image element started at `index`.
    PlotStarted {
        /// Position in [`ClientReassembler::plots`].
        index: usize,
    },
    /// The plot at `index` is complete.
    PlotCompleted {
        /// Position in [`ClientReassembler::plots`].
        index: usize,
    },
    /// A data frame snapshot is ready to render.
    Table(DataTable),
    /// The data frame name list changed; empty means "no frames".
    FrameList(Vec<String>),
    /// A buffered value could not be parsed and was discarded.
    DecodeFailed {
        /// Which channel.
        kind: OutboundKind,
        /// Parser message.
        reason: String,
    },
}

/// Per-connection reassembly state.
#[derive(Debug, Default)]
pub struct ClientReassembler {
    transcript: Vec<TranscriptEntry>,
    plots: Vec<PlotImage>,
    working_plot: Option<usize>,
    dataframe_buf: String,
    dflist_buf: String,
    table: Option<DataTable>,
    frames: Vec<String>,
}

impl ClientReassembler {
    /// Create empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one outbound message.
    ///
    /// Returns `None` for fragments that only extend a buffer, as well as
    /// for terminators with nothing buffered.
    pub fn apply(&mut self, msg: &OutboundMessage) -> Option<ClientUpdate> {
        match msg.kind {
            OutboundKind::Stdout | OutboundKind::Stderr => {
                self.transcript.push(TranscriptEntry {
                    stream: msg.kind,
                    text: msg.data.clone(),
                });
                Some(ClientUpdate::Transcript)
            }
            OutboundKind::Plot => self.apply_plot(&msg.data),
            OutboundKind::Dataframe => {
                if !msg.is_terminator() {
                    self.dataframe_buf.push_str(&msg.data);
                    return None;
                }
                let raw = std::mem::take(&mut self.dataframe_buf);
                let update = decode(OutboundKind::Dataframe, &raw, |value| {
                    DataTable::from_records(&value).map(ClientUpdate::Table)
                })?;
                if let ClientUpdate::Table(table) = &update {
                    self.table = Some(table.clone());
                }
                Some(update)
            }
            OutboundKind::Dflist => {
                if !msg.is_terminator() {
                    self.dflist_buf.push_str(&msg.data);
                    return None;
                }
                let raw = std::mem::take(&mut self.dflist_buf);
                let update = decode(OutboundKind::Dflist, &raw, |value| {
                    serde_json::from_value::<Vec<String>>(value)
                        .map(ClientUpdate::FrameList)
                        .map_err(|err| err.to_string())
                })?;
                if let ClientUpdate::FrameList(names) = &update {
                    self.frames.clone_from(names);
                }
                Some(update)
            }
        }
    }

    fn apply_plot(&mut self, data: &str) -> Option<ClientUpdate> {
        if data.is_empty() {
            let index = self.working_plot.take()?;
            if let Some(plot) = self.plots.get_mut(index) {
                plot.complete = true;
            }
            return Some(ClientUpdate::PlotCompleted { index });
        }

        match self.working_plot.and_then(|i| self.plots.get_mut(i)) {
            Some(plot) => {
                plot.src.push_str(data);
                None
            }
            None => {
                let index = self.plots.len();
                self.plots.push(PlotImage {
                    src: format!("{PLOT_URI_PREFIX}{data}"),
                    complete: false,
                });
                self.working_plot = Some(index);
                Some(ClientUpdate::PlotStarted { index })
            }
        }
    }

    /// Transcript so far.
    #[must_use]
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Plots so far, oldest first.
    #[must_use]
    pub fn plots(&self) -> &[PlotImage] {
        &self.plots
    }

    /// Most recently rendered data frame.
    #[must_use]
    pub fn table(&self) -> Option<&DataTable> {
        self.table.as_ref()
    }

    /// Most recent data frame name list.
    #[must_use]
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// Command selecting the frame `name` from the list.
    #[must_use]
    pub fn select_frame(&self, name: &str) -> InboundCommand {
        InboundCommand::dataframe(name)
    }
}

/// Parse a terminated buffer. An empty buffer yields nothing.
fn decode<F>(kind: OutboundKind, raw: &str, build: F) -> Option<ClientUpdate>
where
    F: FnOnce(Value) -> std::result::Result<ClientUpdate, String>,
{
    if raw.trim().is_empty() {
        return None;
    }
    let parsed = serde_json::from_str::<Value>(raw)
        .map_err(|err| err.to_string())
        .and_then(build);
    Some(parsed.unwrap_or_else(|reason| ClientUpdate::DecodeFailed { kind, reason }))
}
