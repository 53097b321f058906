// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (running the pipeline or inspecting a corpus).
//
// Rules for this layer:
//   - No tensor or batching code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training-run workflow
pub mod run_use_case;

// The corpus inspection workflow
pub mod inspect_use_case;
