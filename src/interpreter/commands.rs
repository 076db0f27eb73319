//! Bookkeeping commands injected into the interpreter.
//!
//! Every injected command is wrapped in `invisible(...)` so it prints
//! nothing, and tagged with the marker token so its echo is dropped by the
//! stdout filter.

use crate::config::{PipeNames, PlotConfig};

/// Builds the text of injected interpreter commands.
#[derive(Debug, Clone)]
pub struct BookkeepingCommands {
    marker: String,
    plot: PlotConfig,
    pipes: PipeNames,
}

impl BookkeepingCommands {
    /// Create a builder tagging commands with `marker`.
    #[must_use]
    pub fn new(marker: impl Into<String>, plot: PlotConfig, pipes: PipeNames) -> Self {
        Self {
            marker: marker.into(),
            plot,
            pipes,
        }
    }

    /// Marker token carried by every injected command.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Wrap `expr` so it prints nothing and its echo is filtered.
    #[must_use]
    pub fn silent(&self, expr: &str) -> String {
        format!("invisible({expr}) {}\n", self.marker)
    }

    /// Commands injected after every forwarded `stdin` payload, in order:
    /// close the plot device, open a fresh one on the image pipe, and
    /// publish the current data frame names to the dflist pipe.
    #[must_use]
    pub fn after_stdin(&self) -> [String; 3] {
        [
            self.silent("dev.off()"),
            self.silent(&format!(
                "png(\"{}\", {}, {})",
                self.pipes.image, self.plot.width, self.plot.height
            )),
            self.silent(&format!(
                "write(toJSON(names(sapply(ls(), function(x) class(get(x)))\
                 [unlist(sapply(sapply(ls(), function(x) class(get(x))), \
                 function(x) \"data.frame\" %in% x))])), file = \"{}\")",
                self.pipes.dflist
            )),
        ]
    }

    /// Command serializing the value `name` to the dataframe pipe.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> String {
        self.silent(&format!(
            "write(toJSON({name}), file = \"{}\")",
            self.pipes.dataframe
        ))
    }
}
