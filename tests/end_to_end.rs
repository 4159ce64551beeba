use tinyml_accel::config::Config;
use tinyml_accel::graph::builder::GraphBuilder;
use tinyml_accel::graph::NodeKind;
use tinyml_accel::simulator::Simulator;
use tinyml_accel::Compiler;

/// Builds the 784 -> 12 -> 10 network used by
/// `small_mlp_matches_the_golden_output_vector`. Both weight matrices are
/// sparse by construction so the golden output below can be derived by
/// hand rather than by re-running this same code:
///
/// - `w1` has a single nonzero entry per row, `w1[r][r] = 127.0` for
///   `r in 0..12`, so each of the 12 first-layer accumulators is just
///   `127 * x[r]` (every other input column is multiplied by zero).
/// - `w2` has six nonzero entries per row, one at each even column
///   `0, 2, ..., 10`, all equal to a single per-row weight `w2_vals[r]`.
///   ReLU zeroes every odd-indexed first-layer output, so the second
///   gemv only ever sees the even-indexed activations.
///
/// Both weight tensors contain one entry of magnitude exactly 127.0, so
/// `pick_scale` resolves to `1.0` and quantization is the identity on
/// every integer-valued entry here; both bias vectors are all zero.
fn golden_784_12_10_graph() -> tinyml_accel::graph::ModelGraph {
    let mut w1 = vec![0.0f32; 12 * 784];
    for r in 0..12 {
        w1[r * 784 + r] = 127.0;
    }
    let b1 = vec![0.0f32; 12];

    let w2_vals: [f32; 10] = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0, 5.0, 127.0];
    let mut w2 = vec![0.0f32; 10 * 12];
    for (r, &v) in w2_vals.iter().enumerate() {
        for k in 0..6 {
            w2[r * 12 + 2 * k] = v;
        }
    }
    let b2 = vec![0.0f32; 10];

    GraphBuilder::new()
        .input("x")
        .output("y")
        .shape("x", &[784])
        .initializer("w1", w1, vec![12, 784])
        .initializer("b1", b1, vec![12])
        .initializer("w2", w2, vec![10, 12])
        .initializer("b2", b2, vec![10])
        .node("gemm1", NodeKind::Gemm, &["x", "w1"], &["h1"])
        .node("bias1", NodeKind::Add, &["h1", "b1"], &["h1b"])
        .node("relu1", NodeKind::Relu, &["h1b"], &["a1"])
        .node("gemm2", NodeKind::Gemm, &["a1", "w2"], &["h2"])
        .node("bias2", NodeKind::Add, &["h2", "b2"], &["y"])
        .build()
}

/// Scenario F: a 784 -> 12 -> 10 network with prescribed initializers,
/// compiled and run against a golden 10-byte output vector checked
/// bit-for-bit.
///
/// With input `x[r] = [1,-1,2,-2,3,-3,4,-4,5,-5,6,-6]` for `r in 0..12`
/// (rest zero), the first-layer accumulators are
/// `127 * x[r] = [127,-127,254,-254,381,-381,508,-508,635,-635,762,-762]`,
/// `max_abs = 762`, giving post-requantization activations
/// `[21,-21,42,-42,63,-63,85,-85,106,-106,127,-127]`. ReLU zeroes the
/// negative (odd-indexed) entries, leaving
/// `a1 = [21,0,42,0,63,0,85,0,106,0,127,0]`, whose even-indexed entries
/// sum to `444`. Each second-layer accumulator is therefore
/// `444 * w2_vals[r]`, with `max_abs = 444 * 127 = 56388`; requantizing
/// that vector reproduces `w2_vals` itself (the boundary entry maps to
/// exactly 127, the others round back to their own integer values).
#[test]
fn small_mlp_matches_the_golden_output_vector() {
    let graph = golden_784_12_10_graph();
    let config = Config::reference();
    let mut compiled = Compiler::compile(&graph, &config).unwrap();

    let mut input = vec![0i8; 784];
    let xs: [i8; 12] = [1, -1, 2, -2, 3, -3, 4, -4, 5, -5, 6, -6];
    input[..12].copy_from_slice(&xs);
    compiled.image.write_input(&input).unwrap();

    let mut sim = Simulator::new(config);
    let output = sim.run(&compiled.image).unwrap();
    assert_eq!(output, vec![1i8, -1, 2, -2, 3, -3, 4, -4, 5, 127]);
}

#[test]
fn json_model_loads_and_compiles_identically_to_the_builder_equivalent() {
    let json = r#"{
        "input": "x",
        "output": "y",
        "initializers": {
            "w1": {"data": [1.0, 0.0, 0.0, 1.0], "shape": [2, 2]},
            "b1": {"data": [1.0, 2.0], "shape": [2]}
        },
        "nodes": [
            {"name": "gemm1", "op": "Gemm", "inputs": ["x", "w1"], "outputs": ["h1"]},
            {"name": "bias1", "op": "Add", "inputs": ["h1", "b1"], "outputs": ["y"]}
        ],
        "shapes": {"x": [2]}
    }"#;

    let model: tinyml_accel::graph::builder::JsonModel = serde_json::from_str(json).unwrap();
    let graph = model.into_graph().unwrap();

    let config = Config::reference();
    let compiled = Compiler::compile(&graph, &config).unwrap();
    assert!(!compiled.schedule.instructions.is_empty());
}
