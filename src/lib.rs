// Chat moderation pipeline.
//
// **Architecture Overview:**
// - `core/` = Business logic (transport-agnostic)
// - `infra/` = Implementations of core traits (clocks, configuration)
// - `console/` = A line-based transport adapter (used by the binary)

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "console/console_layer.rs"]
pub mod console;
#[path = "infra/infra_layer.rs"]
pub mod infra;
