use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use styleops::*;

fn random(rng: &mut StdRng, shape: Vec<usize>) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|_| rng.random_range(-1.0f32..1.0)).collect();
    Tensor::new(shape, data).to_device(Backend::Cpu)
}

fn random_kernel(rng: &mut StdRng, kh: usize, kw: usize) -> FilterKernel {
    let taps = (0..kh * kw).map(|_| rng.random_range(-1.0f32..1.0)).collect();
    FilterKernel::new(kh, kw, taps).unwrap()
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum()
}

fn abs_dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (f64::from(x) * f64::from(y)).abs())
        .sum()
}

/// `<A x, g> == <x, Aᵀ g>` for the forward operator `A` and its backward pass.
#[test]
fn test_resample_backward_is_adjoint() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut checked = 0;
    for _ in 0..300 {
        let h = rng.random_range(1..7);
        let w = rng.random_range(1..7);
        let kh = rng.random_range(1..5);
        let kw = rng.random_range(1..5);
        let params = ResampleParams {
            up_x: rng.random_range(1..4),
            up_y: rng.random_range(1..4),
            down_x: rng.random_range(1..4),
            down_y: rng.random_range(1..4),
            pad: Padding {
                x0: rng.random_range(-2i32..4) as isize,
                x1: rng.random_range(-2i32..4) as isize,
                y0: rng.random_range(-2i32..4) as isize,
                y1: rng.random_range(-2i32..4) as isize,
            },
        };
        let kernel = random_kernel(&mut rng, kh, kw);
        let x = random(&mut rng, vec![2, 1, h, w]);
        let Ok(y) = resample_forward(&x, &kernel, &params) else {
            continue;
        };
        let g = random(&mut rng, y.shape.clone());
        let dx = resample_backward(&g, &x.shape, &kernel, &params).unwrap();
        assert_eq!(dx.shape, x.shape);

        let lhs = dot(&y.data, &g.data);
        let rhs = dot(&x.data, &dx.data);
        let scale = abs_dot(&x.data, &dx.data).max(abs_dot(&y.data, &g.data)).max(1.0);
        assert!(
            (lhs - rhs).abs() <= 1e-4 * scale,
            "{params:?} kernel {kh}x{kw} input {h}x{w}: {lhs} vs {rhs}"
        );
        checked += 1;
    }
    assert!(checked > 50, "only {checked} valid configurations");
}

/// Central differences on single input samples.
#[test]
fn test_resample_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(11);
    let kernel = FilterKernel::binomial(4).unwrap();
    for params in [
        ResampleParams::uniform(2, 1, (2, 1)),
        ResampleParams::uniform(1, 2, (1, 1)),
        ResampleParams::default().with_up(2, 1).with_down(1, 3).with_pad((0, 3, -1, 2)),
    ] {
        let x = random(&mut rng, vec![1, 2, 5, 6]);
        let y = resample_forward(&x, &kernel, &params).unwrap();
        let g = random(&mut rng, y.shape.clone());
        let dx = resample_backward(&g, &x.shape, &kernel, &params).unwrap();

        let loss = |t: &Tensor| dot(&resample_forward(t, &kernel, &params).unwrap().data, &g.data);
        let h = 0.5f32;
        for _ in 0..10 {
            let i = rng.random_range(0..x.numel());
            let mut plus = x.clone();
            plus.data[i] += h;
            let mut minus = x.clone();
            minus.data[i] -= h;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * f64::from(h));
            let analytic = f64::from(dx.data[i]);
            assert!(
                (numeric - analytic).abs() < 1e-3,
                "{params:?} at {i}: {numeric} vs {analytic}"
            );
        }
    }
}

#[test]
fn test_activation_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(42);
    let act = ActivationParams::new(0.2, std::f32::consts::SQRT_2).unwrap();
    let mut x = random(&mut rng, vec![2, 3, 4, 4]);
    let bias = random(&mut rng, vec![3]);
    let h = 1e-2f32;

    // keep every pre-activation clear of the kink
    let inner = 16;
    for (i, v) in x.data.iter_mut().enumerate() {
        let b = bias.data[(i / inner) % 3];
        if (*v + b).abs() < 4.0 * h {
            *v += 0.25;
        }
    }

    let g = random(&mut rng, x.shape.clone());
    let grads = activation_backward(&g, &x, Some(&bias), &act, true, true).unwrap();
    let dx = grads.input.unwrap();
    let db = grads.bias.unwrap();

    let shifted = |dx_all: f32, db_c: Option<(usize, f32)>| {
        let mut xs = x.clone();
        xs.data.iter_mut().for_each(|v| *v += dx_all);
        let mut bs = bias.clone();
        if let Some((c, d)) = db_c {
            bs.data[c] += d;
        }
        activation_forward(&xs, Some(&bs), &act).unwrap()
    };

    // elementwise op: shifting every input at once gives every partial derivative
    let plus = shifted(h, None);
    let minus = shifted(-h, None);
    for i in 0..x.numel() {
        let slope = (plus.data[i] - minus.data[i]) / (2.0 * h);
        let numeric = g.data[i] * slope;
        assert!(
            (numeric - dx.data[i]).abs() < 1e-3 * (1.0 + dx.data[i].abs()),
            "input {i}: {numeric} vs {}",
            dx.data[i]
        );
    }

    for c in 0..3 {
        let lp = dot(&shifted(0.0, Some((c, h))).data, &g.data);
        let lm = dot(&shifted(0.0, Some((c, -h))).data, &g.data);
        let numeric = (lp - lm) / (2.0 * f64::from(h));
        let analytic = f64::from(db.data[c]);
        assert!(
            (numeric - analytic).abs() < 1e-2 * (1.0 + analytic.abs()),
            "bias {c}: {numeric} vs {analytic}"
        );
    }
}

#[test]
fn test_layer_gradients_are_adjoint() {
    use styleops::layers::{Blur, Downsample, Upsample};

    let mut rng = StdRng::seed_from_u64(7);
    let taps = [1.0, 3.0, 3.0, 1.0];
    let x = random(&mut rng, vec![1, 2, 6, 6]);

    let up = Upsample::new(&taps, 2).unwrap();
    let down = Downsample::new(&taps, 2).unwrap();
    let blur = Blur::new(&taps, (2, 1), 2).unwrap();

    let y = up.forward(&x).unwrap();
    let g = random(&mut rng, y.shape.clone());
    let dx = up.backward(&g, &x.shape).unwrap();
    assert!((dot(&y.data, &g.data) - dot(&x.data, &dx.data)).abs() < 1e-3);

    let y = down.forward(&x).unwrap();
    let g = random(&mut rng, y.shape.clone());
    let dx = down.backward(&g, &x.shape).unwrap();
    assert!((dot(&y.data, &g.data) - dot(&x.data, &dx.data)).abs() < 1e-3);

    let y = blur.forward(&x).unwrap();
    let g = random(&mut rng, y.shape.clone());
    let dx = blur.backward(&g, &x.shape).unwrap();
    assert!((dot(&y.data, &g.data) - dot(&x.data, &dx.data)).abs() < 1e-3);
}
