//! Improved Interior Algorithm Example
//!
//! minimize    f1(x) + f2(x)
//!
//! with f1 L-smooth convex, f2 the indicator of a closed convex set and h a
//! mu-strongly convex kernel. Each iteration takes a Bregman step on h + f2,
//! an accelerated method measured against the Bregman distance D_h(x*, x0).

use pepcert::prelude::*;

fn main() {
    env_logger::init();
    println!("=== Improved Interior Algorithm ===\n");

    let l = 1.0;
    let mu = 1.0;
    let c = 1.0;
    let lam = 1.0;
    let n = 5;

    let mut pep = Pep::new();
    let func1 = pep
        .declare_function(FunctionClass::SmoothConvex { l })
        .expect("invalid class");
    let func2 = pep
        .declare_function(FunctionClass::ConvexIndicator { d: f64::INFINITY })
        .expect("invalid class");
    let h = pep
        .declare_function(FunctionClass::StronglyConvex { mu })
        .expect("invalid class");
    h.set_reuse_gradient(true);

    let func = &func1 + &func2;
    let mirror = &h + &func2;

    let xs = func.stationary_point();
    let fs = func.value(&xs);
    let (_, hs) = h.oracle(&xs);
    let x0 = pep.set_initial_point().expect("problem is open");
    let (gh0, h0) = h.oracle(&x0);
    let (g10, f10) = func1.oracle(&x0);

    // c D_h(x*, x0) + f1(x0) - f* <= 1
    let bregman = &hs - &h0 - gh0.inner(&(&xs - &x0));
    pep.set_initial_condition((bregman * c + &f10 - &fs).leq(1.0))
        .expect("problem is open");

    let mut g = g10;
    let mut gh = gh0;
    let mut x = x0.clone();
    let mut z = x0;
    let mut ck = c;
    for i in 0..n {
        let alpha = (((ck * lam).powi(2) + 4.0 * ck * lam).sqrt() - lam * ck) / 2.0;
        ck *= 1.0 - alpha;
        let y = (1.0 - alpha) * &x + alpha * &z;
        if i >= 1 {
            g = func1.gradient(&y);
        }
        (z, _, _) = bregman_gradient_step(&g, &gh, &mirror, alpha / ck);
        x = (1.0 - alpha) * &x + alpha * &z;
        gh = h.gradient(&z);
    }
    pep.set_performance_metric(func.value(&x) - &fs)
        .expect("problem is open");

    let outcome = pep.solve().expect("Failed to solve");
    let theory = 4.0 * l / (c * ((n + 1) as f64).powi(2));

    println!("Status: {}", outcome.status);
    if let Some(tau) = outcome.tau {
        println!("  Worst case (PEP):  f(x_n) - f* <= {:.6}", tau);
    }
    println!("  Theoretical bound: f(x_n) - f* <= {:.6}", theory);
}
