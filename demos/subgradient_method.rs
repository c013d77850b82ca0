//! Subgradient Method Example
//!
//! Worst-case best-iterate gap of the subgradient method
//!
//! x_{k+1} = x_k - gamma g_k,   g_k in df(x_k)
//!
//! on convex M-Lipschitz functions, from ||x0 - x*|| <= 1.
//!
//! Run with `RUST_LOG=info` to see the problem setup.

use pepcert::prelude::*;

fn main() {
    env_logger::init();
    println!("=== Subgradient Method ===\n");

    let m = 2.0;
    let n = 6;
    let gamma = 1.0 / (m * ((n + 1) as f64).sqrt());

    let settings = Settings {
        verbosity: Verbosity::Setup,
        ..Settings::default()
    };
    let mut pep = Pep::with_settings(settings).expect("invalid settings");
    let f = pep
        .declare_function(FunctionClass::ConvexLipschitz { m })
        .expect("invalid class");

    let xs = f.stationary_point();
    let fs = f.value(&xs);
    let x0 = pep.set_initial_point().expect("problem is open");
    pep.set_initial_condition((&x0 - &xs).square().leq(1.0))
        .expect("problem is open");

    // min_k f(x_k) - f* over all iterates
    let mut x = x0;
    let (mut g, mut fx) = f.oracle(&x);
    for _ in 0..n {
        pep.set_performance_metric(&fx - &fs).expect("problem is open");
        x = &x - gamma * &g;
        (g, fx) = f.oracle(&x);
    }
    pep.set_performance_metric(&fx - &fs).expect("problem is open");

    let outcome = pep.solve().expect("Failed to solve");
    let theory = m / ((n + 1) as f64).sqrt();

    println!("Parameters: M = {}, n = {}, gamma = {:.6}", m, n, gamma);
    println!("Status: {}", outcome.status);
    if let Some(tau) = outcome.tau {
        println!("  Worst case (PEP):  min_k f(x_k) - f* <= {:.6}", tau);
    }
    println!("  Theoretical bound: min_k f(x_k) - f* <= {:.6}", theory);
}
