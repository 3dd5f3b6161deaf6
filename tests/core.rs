use styleops::backprop::{fused_leaky_relu, upfirdn2d};
use styleops::layers::{Blur, Downsample, FusedLeakyReLU, Upsample};
use styleops::*;

fn cpu(shape: Vec<usize>, data: Vec<f32>) -> Tensor {
    Tensor::new(shape, data).to_device(Backend::Cpu)
}

fn iota(shape: Vec<usize>) -> Tensor {
    let n: usize = shape.iter().product();
    cpu(shape, (0..n).map(|v| v as f32).collect())
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
    assert!(matches!(
        Tensor::try_new(vec![2, 2], vec![1.0f32; 3]),
        Err(Error::InvalidShape(_))
    ));
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[[[1.0, 2.0], [3.0, 4.0]]]]);
    assert_eq!(t.shape, vec![1, 1, 2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_identity_resample_is_exact() {
    let x = cpu(vec![2, 2, 3, 5], (0..60).map(|v| (v as f32).sin() * 1e3).collect());
    let y = resample_forward(&x, &FilterKernel::identity(), &ResampleParams::default()).unwrap();
    assert_eq!(y.shape, x.shape);
    assert_eq!(y.data, x.data);
}

#[test]
fn test_output_shape_follows_formula() {
    let x = iota(vec![1, 2, 7, 6]);
    for kh in 1..4 {
        for kw in 1..4 {
            let k = FilterKernel::new(kh, kw, vec![1.0; kh * kw]).unwrap();
            for up in 1..3 {
                for down in 1..3 {
                    let p = ResampleParams::uniform(up, down, (1, -1, 0, 2));
                    let hp = 7 * up as isize + 2;
                    let wp = 6 * up as isize;
                    let ho = (hp - kh as isize).div_euclid(down as isize) + 1;
                    let wo = (wp - kw as isize).div_euclid(down as isize) + 1;
                    let y = resample_forward(&x, &k, &p).unwrap();
                    assert_eq!(y.shape, vec![1, 2, ho as usize, wo as usize]);
                }
            }
        }
    }
}

#[test]
fn test_non_positive_output_rejected() {
    let x = iota(vec![1, 1, 2, 2]);
    let k = FilterKernel::new(3, 3, vec![1.0; 9]).unwrap();
    let err = resample_forward(&x, &k, &ResampleParams::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidShape(_)));

    let err = resample_forward(&x, &FilterKernel::identity(), &ResampleParams::uniform(1, 1, -1))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidShape(_)));
}

#[test]
fn test_upsample_then_downsample_is_identity() {
    // delta at the centre of a 3x3 kernel, pad 1 cancels the kernel extent
    let mut taps = vec![0.0; 9];
    taps[4] = 1.0;
    let delta = FilterKernel::new(3, 3, taps).unwrap();
    let x = cpu(vec![2, 1, 4, 3], (0..24).map(|v| v as f32 * 0.25 - 2.0).collect());
    for factor in 1..4 {
        let up = resample_forward(&x, &delta, &ResampleParams::uniform(factor, 1, 1)).unwrap();
        assert_eq!(up.shape, vec![2, 1, 4 * factor, 3 * factor]);
        let down = resample_forward(&up, &delta, &ResampleParams::uniform(1, factor, 1)).unwrap();
        assert_eq!(down.data, x.data, "factor {factor}");
    }
}

#[test]
fn test_negative_padding_crops() {
    let x = iota(vec![1, 1, 4, 4]);
    let p = ResampleParams::default().with_pad((-1, -1, 0, 0));
    let y = resample_forward(&x, &FilterKernel::identity(), &p).unwrap();
    assert_eq!(y.shape, vec![1, 1, 4, 2]);
    let expected: Vec<f32> = (0..4)
        .flat_map(|r| [x.data[r * 4 + 1], x.data[r * 4 + 2]])
        .collect();
    assert_eq!(y.data, expected);
}

#[test]
fn test_kernel_is_applied_as_convolution() {
    // an impulse reproduces the kernel itself, not its mirror image
    let k = FilterKernel::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let x = cpu(vec![1, 1, 1, 1], vec![1.0]);
    let p = ResampleParams::default().with_pad((2, 2, 1, 1));
    let y = resample_forward(&x, &k, &p).unwrap();
    assert_eq!(y.shape, vec![1, 1, 2, 3]);
    assert_eq!(y.data, k.taps());
}

#[test]
fn test_transpose_params_swap_factors() {
    let k = FilterKernel::binomial(4).unwrap();
    let p = ResampleParams::uniform(2, 1, (2, 1));
    let geo = ResampleShape::compute(5, 5, &k, &p).unwrap();
    assert_eq!((geo.out_h, geo.out_w), (10, 10));
    let t = p.transpose(4, 4, &geo).unwrap();
    assert_eq!((t.up_x, t.up_y, t.down_x, t.down_y), (1, 1, 2, 2));
    assert_eq!(t.pad, Padding::from((1, 1)));
    let back = ResampleShape::compute(10, 10, &k.flipped(), &t).unwrap();
    assert_eq!((back.out_h, back.out_w), (5, 5));
}

#[test]
fn test_resample_backward_shape_mismatch() {
    let k = FilterKernel::binomial(2).unwrap();
    let p = ResampleParams::default();
    let g = iota(vec![1, 1, 4, 4]);
    let err = resample_backward(&g, &[1, 1, 4, 4], &k, &p).unwrap_err();
    assert_eq!(
        err,
        Error::ShapeMismatch {
            expected: vec![1, 1, 3, 3],
            got: vec![1, 1, 4, 4]
        }
    );
}

#[test]
fn test_activation_forward_values() {
    let x = cpu(vec![1, 2, 2], vec![-2.0, 1.0, -0.5, 0.25]);
    let b = cpu(vec![2], vec![0.5, 0.5]);
    let act = ActivationParams::new(0.1, 2.0).unwrap();
    let y = activation_forward(&x, Some(&b), &act).unwrap();
    let expected = [-0.3, 3.0, 0.0, 1.5];
    assert!(approx::approx_eq(&y.data[..], &expected[..]), "{:?}", y.data);
}

#[test]
fn test_activation_boundary_takes_slope_branch() {
    let act = ActivationParams::new(0.2, 3.0).unwrap();
    let x = cpu(vec![1, 2, 1], vec![-1.5, 2.0]);
    let b = cpu(vec![2], vec![1.5, -2.0]);
    let y = activation_forward(&x, Some(&b), &act).unwrap();
    assert_eq!(y.data, vec![0.0, 0.0]);

    let g = cpu(vec![1, 2, 1], vec![1.0, 1.0]);
    let grads = activation_backward(&g, &x, Some(&b), &act, true, true).unwrap();
    let gi = grads.input.unwrap();
    assert!(approx::approx_eq(&gi.data[..], &[0.6f32, 0.6][..]));
}

#[test]
fn test_bias_gradient_sums_non_channel_axes() {
    // shape [2, 3, 2]: every element positive so the gradient is dy * scale
    let x = cpu(vec![2, 3, 2], vec![1.0; 12]);
    let b = cpu(vec![3], vec![0.0; 3]);
    let g = cpu(vec![2, 3, 2], (1..=12).map(|v| v as f32).collect());
    let act = ActivationParams::new(0.2, 1.0).unwrap();
    let grads = activation_backward(&g, &x, Some(&b), &act, true, true).unwrap();
    assert_eq!(grads.input.unwrap().data, g.data);
    let db = grads.bias.unwrap();
    assert_eq!(db.shape, vec![3]);
    assert_eq!(db.data, vec![1.0 + 2.0 + 7.0 + 8.0, 3.0 + 4.0 + 9.0 + 10.0, 5.0 + 6.0 + 11.0 + 12.0]);
}

#[test]
fn test_unrequested_gradients_are_absent() {
    let x = cpu(vec![1, 1, 2], vec![1.0, -1.0]);
    let g = cpu(vec![1, 1, 2], vec![1.0, 1.0]);
    let b = cpu(vec![1], vec![0.0]);
    let act = ActivationParams::default();

    let none = activation_backward(&g, &x, Some(&b), &act, false, false).unwrap();
    assert!(none.input.is_none() && none.bias.is_none());

    let no_bias = activation_backward(&g, &x, None, &act, true, true).unwrap();
    assert!(no_bias.input.is_some());
    assert!(no_bias.bias.is_none());
}

#[test]
fn test_activation_rejects_bad_inputs() {
    let x = cpu(vec![1, 2, 2], vec![0.0; 4]);
    let act = ActivationParams::default();
    let wrong_bias = cpu(vec![4], vec![0.0; 4]);
    assert!(matches!(
        activation_forward(&x, Some(&wrong_bias), &act),
        Err(Error::ShapeMismatch { .. })
    ));
    let bad = ActivationParams {
        negative_slope: -0.2,
        scale: 1.0,
    };
    assert!(matches!(
        activation_forward(&x, None, &bad),
        Err(Error::InvalidParameter { name: "negative_slope", .. })
    ));
    let g = cpu(vec![1, 4], vec![0.0; 4]);
    assert!(matches!(
        activation_backward(&g, &x, None, &act, true, false),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_empty_activation() {
    let x = cpu(vec![0, 3, 4], Vec::new());
    let b = cpu(vec![3], vec![1.0; 3]);
    let y = activation_forward(&x, Some(&b), &ActivationParams::default()).unwrap();
    assert_eq!(y.shape, vec![0, 3, 4]);
    let grads =
        activation_backward(&y, &x, Some(&b), &ActivationParams::default(), true, true).unwrap();
    assert_eq!(grads.bias.unwrap().data, vec![0.0; 3]);
}

#[test]
fn test_closure_api() {
    let x = iota(vec![1, 2, 4, 4]);
    let k = FilterKernel::binomial(3).unwrap();
    let p = ResampleParams::uniform(1, 1, 1);
    let (y, back) = upfirdn2d(&x, &k, &p).unwrap();
    assert_eq!(y.shape, x.shape);
    let dx = back(&y).unwrap();
    assert_eq!(dx.shape, x.shape);
    assert!(back(&x.clone().to_device(Backend::Cpu)).is_ok());
    assert!(back(&iota(vec![1, 2, 3, 3])).is_err());

    let bias = cpu(vec![2], vec![0.1, -0.1]);
    let (z, back) = fused_leaky_relu(&y, Some(&bias), ActivationParams::default()).unwrap();
    let grads = back(&z, GradNeeds::ALL).unwrap();
    assert_eq!(grads.input.unwrap().shape, y.shape);
    assert_eq!(grads.bias.unwrap().shape, vec![2]);
}

#[test]
fn test_layers_compose() {
    let x = cpu(vec![1, 3, 8, 8], vec![0.5; 192]);
    let down = Downsample::new(&[1.0, 3.0, 3.0, 1.0], 2).unwrap();
    let up = Upsample::new(&[1.0, 3.0, 3.0, 1.0], 2).unwrap();
    let blur = Blur::new(&[1.0, 3.0, 3.0, 1.0], (2, 1), 1).unwrap();
    let act = FusedLeakyReLU::new(3, true);

    let h = down.forward(&x).unwrap();
    assert_eq!(h.shape, vec![1, 3, 4, 4]);
    let h = up.forward(&h).unwrap();
    assert_eq!(h.shape, x.shape);
    let h = blur.forward(&h).unwrap();
    assert_eq!(h.shape, x.shape);
    let y = act.forward(&h).unwrap();
    assert_eq!(y.shape, x.shape);

    let g = act.backward(&y, &h, GradNeeds::ALL).unwrap().input.unwrap();
    let g = blur.backward(&g, &x.shape).unwrap();
    let g = up.backward(&g, &[1, 3, 4, 4]).unwrap();
    let g = down.backward(&g, &x.shape).unwrap();
    assert_eq!(g.shape, x.shape);
}

#[test]
fn test_shared_kernel_across_threads() {
    let k = FilterKernel::binomial(4).unwrap();
    let p = ResampleParams::uniform(2, 1, (2, 1));
    let x = cpu(vec![1, 4, 6, 6], (0..144).map(|v| (v % 7) as f32).collect());
    let expected = resample_forward(&x, &k, &p).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| resample_forward(&x, &k, &p).unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_availability_probe_is_consistent_across_threads() {
    let seen: Vec<bool> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(accelerated_available)).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(seen.iter().all(|&v| v == seen[0]));
    assert_eq!(accelerated_available(), seen[0]);
    if !cfg!(feature = "wgpu") {
        assert!(!seen[0]);
    }
}

#[test]
fn test_wgpu_tag_is_preserved() {
    let x = iota(vec![1, 1, 3, 3]).to_device(Backend::Wgpu);
    let y = resample_forward(&x, &FilterKernel::identity(), &ResampleParams::default()).unwrap();
    assert_eq!(y.device, Backend::Wgpu);
    assert_eq!(y.data, x.data);
}
