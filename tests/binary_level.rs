#![cfg(feature = "binary_level")]

use kestrel_probes::bake::{CubemapData, LightData, ProbeData, Vec3Data};
use kestrel_probes::{BakedLighting, LeafId, LightKind};
use tempfile::tempdir;

fn v(x: f32, y: f32, z: f32) -> Vec3Data {
    Vec3Data { x, y, z }
}

#[test]
fn compressed_bake_keeps_every_record() {
    let baked = BakedLighting {
        probes: vec![ProbeData { leaf: LeafId(1), position: v(1.0, 2.0, 3.0), cube: [v(0.5, 0.25, 0.125); 6] }],
        lights: vec![LightData {
            leaf: LeafId(0),
            kind: LightKind::Spot,
            position: v(0.0, 4.0, 0.0),
            direction: v(0.0, -1.0, 0.0),
            color: v(3.0, 3.0, 2.5),
            falloff: [0.0, 0.0, 1.0, 12.0],
            falloff2: [0.9, 0.7, 2.0, 0.0],
            falloff3: [0.0; 4],
        }],
        cubemaps: vec![CubemapData {
            leaf: LeafId(1),
            position: v(1.0, 1.0, 1.0),
            texture: "maps/lobby/cube_0".to_string(),
            captured: true,
        }],
    };

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("bake/lobby.light.lz4");
    baked.save_binary(&path).expect("save binary");
    let loaded = BakedLighting::load_binary(&path).expect("load binary");

    assert_eq!(loaded.probes.len(), 1);
    assert_eq!(loaded.probes[0].cube[3], v(0.5, 0.25, 0.125));
    assert_eq!(loaded.lights[0].kind, LightKind::Spot);
    assert_eq!(loaded.lights[0].falloff2, [0.9, 0.7, 2.0, 0.0]);
    assert!(loaded.cubemaps[0].captured);
}
