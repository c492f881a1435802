//! Terminal output for the CLI
//!
//! Uses `cliclack` log lines and an `indicatif` spinner on a TTY, with a
//! plain `[OK]`/`[FAIL]` fallback in CI and when piped.
//!
//! # Example
//!
//! ```rust,ignore
//! use flakepin::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Resolving htop@3.2.1...");
//! // ... resolve ...
//! spinner.stop("Resolved htop@3.2.1");
//!
//! ui::key_value(&ctx, "attribute", "htop");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, remark, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
