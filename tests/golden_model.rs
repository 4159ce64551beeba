use tinyml_accel::config::Config;
use tinyml_accel::isa::{pack_instructions, Instruction};
use tinyml_accel::memory_image::MemoryImage;
use tinyml_accel::simulator::{Simulator, UnknownOpcodePolicy};

fn tiny_config() -> Config {
    Config {
        data_width_bits: 8,
        tile_elems: 4,
        mem_size_bytes: 4096,
        instructions_base: 0,
        inputs_base: 64,
        biases_base: 128,
        outputs_base: 192,
        weights_base: 256,
        output_length: 4,
    }
}

#[test]
fn all_zero_image_produces_all_zero_output() {
    let config = tiny_config();
    let image = MemoryImage::new(config);
    let mut sim = Simulator::new(config);
    let out = sim.run(&image).unwrap();
    assert_eq!(out, vec![0i8; config.output_length]);
}

#[test]
fn identity_gemv_matches_hand_computed_requantization() {
    let config = tiny_config();
    let mut image = MemoryImage::new(config);

    let identity: Vec<i8> = {
        let mut m = vec![0i8; 16];
        for i in 0..4 {
            m[i * 4 + i] = 1;
        }
        m
    };
    image.write(config.weights_base, &identity).unwrap();
    image.write(config.biases_base, &[10, 20, 30, 40]).unwrap();
    image.write_input(&[1, 2, 3, 4]).unwrap();

    let instrs = vec![
        Instruction::LoadV { dest: 9, addr: config.inputs_base as u32, len: 4 },
        Instruction::LoadM { dest: 1, addr: config.weights_base as u32, rows: 4, cols: 4 },
        Instruction::LoadV { dest: 3, addr: config.biases_base as u32, len: 4 },
        Instruction::Gemv { dest: 5, w: 1, x: 9, b: 3, rows: 4, cols: 4 },
        Instruction::Store { src: 5, addr: config.outputs_base as u32, len: 4 },
    ];
    image.write_instructions(&pack_instructions(&instrs)).unwrap();

    let mut sim = Simulator::new(config);
    let out = sim.run(&image).unwrap();
    // acc = [11, 22, 33, 44], max_abs = 44 -> [32, 64, 95, 127].
    assert_eq!(out, vec![32, 64, 95, 127]);
}

#[test]
fn relu_clips_negatives_and_preserves_saturated_bounds() {
    let config = tiny_config();
    let mut image = MemoryImage::new(config);
    image.write(config.inputs_base, &[3, -5, 0, 127, -128, 42]).unwrap();

    let instrs = vec![
        Instruction::LoadV { dest: 9, addr: config.inputs_base as u32, len: 6 },
        Instruction::Relu { dest: 1, x: 9, len: 6 },
        Instruction::Store { src: 1, addr: config.outputs_base as u32, len: 6 },
    ];
    image.write_instructions(&pack_instructions(&instrs)).unwrap();

    let mut config6 = config;
    config6.output_length = 6;
    let mut sim = Simulator::new(config6);
    let out = sim.run(&image).unwrap();
    assert_eq!(out, vec![3, 0, 0, 127, 0, 42]);
}

#[test]
fn unknown_opcode_is_logged_and_skipped_by_default() {
    let config = tiny_config();
    let mut image = MemoryImage::new(config);
    let word: u64 = 0x1F; // undefined opcode
    image.write_instructions(&word.to_be_bytes()).unwrap();

    let mut sim = Simulator::new(config);
    let out = sim.run(&image).unwrap();
    assert_eq!(out, vec![0i8; config.output_length]);
}

#[test]
fn unknown_opcode_is_fatal_under_the_strict_policy() {
    let config = tiny_config();
    let mut image = MemoryImage::new(config);
    let word: u64 = 0x1F;
    image.write_instructions(&word.to_be_bytes()).unwrap();

    let mut sim = Simulator::with_policy(config, UnknownOpcodePolicy::Fatal);
    assert!(sim.run(&image).is_err());
}
