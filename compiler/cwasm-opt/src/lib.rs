//! Optimizations over module descriptions.
//!
//! The optimizer rewrites a [`WasmModule`] in place. Which passes run is decided by
//! [`OptimizationFlags`]; the order they run in is fixed. Inlining works on the whole module, every
//! other pass on one function at a time:
//!
//! 1. inlining
//! 2. switch chains to jump tables
//! 3. peephole rules
//! 4. partial redundancy elimination
//! 5. dead code elimination
//! 6. copy propagation
//! 7. live range splitting, then local reallocation
//! 8. dead code elimination again, unused local removal, and a second peephole round
//!
//! Every pass preserves the observable behavior of the module.

pub mod analysis;
pub mod error;
pub mod flags;
mod passes;

pub use crate::flags::OptimizationFlags;

use crate::passes::{copy_propagation, dead_code, inlining, locals, peephole, redundancy, switch};
use cwasm_wasm::{WasmFunction, WasmModule};

/// Run the enabled passes over `module`.
pub fn optimize(module: &mut WasmModule, flags: &OptimizationFlags) {
    let _span = tracing::debug_span!("optimize").entered();
    if flags.inlining {
        let changed = inlining::run(module);
        tracing::debug!(changed, "inlining");
    }
    for function in &mut module.functions {
        optimize_function(function, flags);
    }
}

fn optimize_function(function: &mut WasmFunction, flags: &OptimizationFlags) {
    let _span = tracing::debug_span!("function", name = %function.name).entered();
    let mut pass = |name: &str, enabled: bool, run: &dyn Fn(&mut WasmFunction) -> bool| {
        if enabled {
            let changed = run(function);
            tracing::debug!(changed, "{name}");
        }
    };
    pass("switch", flags.generation_switch_br_table, &switch::run);
    pass("peephole", flags.any_peephole(), &|f: &mut WasmFunction| {
        peephole::run(f, flags)
    });
    pass(
        "redundancy",
        flags.partial_redundancy_elimination,
        &redundancy::run,
    );
    pass("dead code", flags.dead_code_elimination, &dead_code::run);
    pass(
        "copy propagation",
        flags.copy_propagation,
        &copy_propagation::run,
    );
    pass(
        "live range splitting",
        flags.live_range_splitting,
        &locals::split_live_ranges,
    );
    pass("reallocation", flags.reallocate_locals, &locals::reallocate);
    pass("dead code", flags.dead_code_elimination, &dead_code::run);
    pass("unused locals", flags.unused_locals, &locals::remove_unused);
    pass(
        "peephole",
        flags.peephole_2nd_pass && flags.any_peephole(),
        &|f: &mut WasmFunction| peephole::run(f, flags),
    );
}
