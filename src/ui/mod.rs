//! Terminal output for the CLI
//!
//! Uses `cliclack` step output and an `indicatif` transfer bar in
//! interactive terminals, plain lines in CI and when piped.
//!
//! ```rust,ignore
//! use repocache::ui::{self, TransferProgress, UiContext};
//!
//! let ctx = UiContext::detect();
//! ui::intro(&ctx, "Fetching http://example.com/repo");
//! let progress = TransferProgress::new(&ctx, token.clone());
//! // manager.create_cache(&location, "content", &progress).await
//! ui::step_ok_detail(&ctx, "content", "/path/to/cache");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_error, outro_success, remark, step_error_detail, step_info,
    step_ok_detail, step_warn_hint,
};
pub use progress::TransferProgress;
