//! Proximal Gradient Example
//!
//! minimize    f1(x) + f2(x)
//!
//! with f1 L-smooth mu-strongly convex and f2 closed convex:
//!
//! x_{k+1} = prox_{gamma f2}(x_k - gamma grad f1(x_k))
//!
//! The contraction ||x_n - x*||^2 <= max(|1 - gamma mu|, |1 - gamma L|)^(2n)
//! is tight.

use pepcert::prelude::*;

fn main() {
    env_logger::init();
    println!("=== Proximal Gradient ===\n");

    let (l, mu, gamma) = (1.0, 0.1, 1.0);

    for n in 1..=3 {
        let mut pep = Pep::new();
        let f1 = pep
            .declare_function(FunctionClass::SmoothStronglyConvex { l, mu })
            .expect("invalid class");
        let f2 = pep
            .declare_function(FunctionClass::Convex)
            .expect("invalid class");
        let func = &f1 + &f2;

        let xs = func.stationary_point();
        let x0 = pep.set_initial_point().expect("problem is open");
        pep.set_initial_condition((&x0 - &xs).square().leq(1.0))
            .expect("problem is open");

        let mut x = x0;
        for _ in 0..n {
            let y = &x - gamma * f1.gradient(&x);
            (x, _, _) = proximal_step(&y, &f2, gamma);
        }
        pep.set_performance_metric((&x - &xs).square())
            .expect("problem is open");

        let outcome = pep.solve().expect("Failed to solve");
        let theory = f64::max((1.0 - gamma * mu).abs(), (1.0 - gamma * l).abs()).powi(2 * n);

        println!("n = {}:", n);
        match outcome.tau {
            Some(tau) => println!("  Worst case (PEP):  {:.6}", tau),
            None => println!("  Solve failed: {}", outcome.status),
        }
        println!("  Theoretical bound: {:.6}", theory);
    }
}
