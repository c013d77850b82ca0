//! Frank-Wolfe (Conditional Gradient) Example
//!
//! minimize    f1(x) + f2(x)
//!
//! with f1 L-smooth convex and f2 the indicator of a convex set of diameter D.
//! Each step solves a linear problem over the set:
//!
//! y_k = argmin_{y in C} <grad f1(x_k), y>,   x_{k+1} = (1 - l_k) x_k + l_k y_k
//!
//! The worst case is then re-solved with log-det dimension reduction to
//! find a low-dimensional bad instance.

use pepcert::prelude::*;

fn main() {
    env_logger::init();
    println!("=== Frank-Wolfe ===\n");

    let l = 1.0;
    let d = 1.0;
    let n = 10;

    let settings = Settings {
        dimension_reduction: Some(DimensionReduction::LogDet { iterations: 12 }),
        ..Settings::default()
    };
    let mut pep = Pep::with_settings(settings).expect("invalid settings");
    let f1 = pep
        .declare_function(FunctionClass::SmoothConvex { l })
        .expect("invalid class");
    let f2 = pep
        .declare_function(FunctionClass::ConvexIndicator { d })
        .expect("invalid class");
    let func = &f1 + &f2;

    let xs = func.stationary_point();
    let fs = func.value(&xs);
    let x0 = pep.set_initial_point().expect("problem is open");
    // x0 is feasible; nothing else is known about it
    let _ = f1.value(&x0);
    let _ = f2.value(&x0);

    let mut x = x0;
    for i in 0..n {
        let g = f1.gradient(&x);
        let (y, _, _) = linear_optimization_step(&g, &f2);
        let lam = 2.0 / (i as f64 + 1.0);
        x = (1.0 - lam) * &x + lam * &y;
    }
    pep.set_performance_metric(func.value(&x) - &fs)
        .expect("problem is open");

    let outcome = pep.solve().expect("Failed to solve");
    let theory = 2.0 * l * d * d / (n as f64 + 2.0);

    println!("Status: {}", outcome.status);
    println!("Gram matrix: {}x{}", outcome.gram_size, outcome.gram_size);
    if let Some(tau) = outcome.tau {
        println!("  Worst case (PEP):  f(x_n) - f* <= {:.6}", tau);
    }
    println!("  Theoretical bound: f(x_n) - f* <= {:.6}", theory);

    if let Some(report) = &outcome.reduction {
        println!("\n--- Dimension reduction ---\n");
        println!("Initial rank: {}", report.initial_rank);
        for (k, step) in report.steps.iter().enumerate() {
            println!("  step {}: {} ({} significant eigenvalues)", k + 1, step.status, step.rank);
        }
        println!("Final rank: {} (converged: {})", report.rank, report.converged);
    }

    match pep.point_value(&x) {
        Ok(v) => println!("\nWorst-case x_n in R^{}: {:.4?}", v.len(), v.as_slice()),
        Err(e) => println!("\nNo worst-case point: {}", e),
    }
}
