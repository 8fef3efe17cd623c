//! Synthetic Rhythmix expression generators for benchmarks.
//!
//! Deterministic for a fixed seed so benchmark runs are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed seed for reproducible benchmarks.
const SEED: u64 = 0xDEAD_BEEF_CAFE;

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

const COMPARE_OPS: &[&str] = &[">", "<", ">=", "<=", "==", "!="];
const UNITS: &[&str] = &["ms", "s", "m"];
const CALCS: &[&str] = &["sum()", "avg()", "count()", "stddev()"];

fn gen_compare(rng: &mut StdRng) -> String {
    let op = COMPARE_OPS[rng.gen_range(0..COMPARE_OPS.len())];
    format!("{op}{}", rng.gen_range(0..100))
}

fn gen_duration(rng: &mut StdRng) -> String {
    let unit = UNITS[rng.gen_range(0..UNITS.len())];
    format!("{}{unit}", rng.gen_range(1..500))
}

fn gen_function(rng: &mut StdRng) -> String {
    match rng.gen_range(0..5) {
        0 => format!("count({}, {})", gen_compare(rng), rng.gen_range(1..10)),
        1 => format!("count!({}, {})", gen_compare(rng), rng.gen_range(1..10)),
        2 => format!("slope({}, {})", gen_compare(rng), gen_duration(rng)),
        3 => format!("delay({})", gen_duration(rng)),
        _ => gen_chain(rng),
    }
}

/// A random valid chain pipeline.
pub fn gen_chain(rng: &mut StdRng) -> String {
    let shaper = match rng.gen_range(0..3) {
        0 => format!(".window({})", rng.gen_range(1..20)),
        1 => format!(".limit({})", gen_duration(rng)),
        _ => String::new(),
    };
    let calc = CALCS[rng.gen_range(0..CALCS.len())];
    format!(
        "filter({}){shaper}.{calc}.meet({})",
        gen_compare(rng),
        gen_compare(rng)
    )
}

/// `n` function calls joined by random logical operators.
pub fn gen_expression(n: usize) -> String {
    let mut rng = rng();
    let mut out = String::new();
    for i in 0..n {
        if i > 0 {
            out.push_str(if rng.gen_bool(0.5) { " && " } else { " || " });
        }
        out.push_str(&gen_function(&mut rng));
    }
    out
}

/// An arrow with `n` stages.
pub fn gen_arrow(n: usize) -> String {
    let mut rng = rng();
    (0..n)
        .map(|_| format!("{{{}}}", gen_compare(&mut rng)))
        .collect::<Vec<_>>()
        .join("->")
}
