use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use kestrel_probes::cli::ReportOptions;
use kestrel_probes::level::LevelVisibility;
use kestrel_probes::time::FrameClock;
use kestrel_probes::{
    AmbientProbeManager, BakedLighting, LeafId, MaterialLighting, NodeUpdate, ObjectId, ProbeConfig,
    StageRoles, StaticLevel,
};
use serde::Serialize;
use std::path::Path;
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("probe_report error: {err:?}");
        process::exit(1);
    }
}

#[derive(Default, Serialize)]
struct FrameSummary {
    frames: u32,
    objects: usize,
    recomputed: usize,
    reused: usize,
    degraded: usize,
    max_lights: usize,
}

fn print_usage() {
    eprintln!(
        "Probe Report

Usage:
  probe_report --level <level.json> --baked <lighting.json> [--config <probes.json>]
               [--frames <count>] [--step <seconds>]

Loads a level and its baked lighting, places one object at every leaf centre and
simulates a slowly orbiting camera with the objects drifting. Prints the resolver
counters as JSON when done.
"
    );
}

fn run() -> Result<()> {
    let options = ReportOptions::parse_from_env()?;
    if options.show_help {
        print_usage();
        return Ok(());
    }
    let level_path = options.level.clone().ok_or_else(|| anyhow!("--level is required"))?;
    let baked_path = options.baked.clone().ok_or_else(|| anyhow!("--baked is required"))?;
    let config = match &options.config {
        Some(path) => ProbeConfig::load_or_default(path),
        None => ProbeConfig::default(),
    };

    let level: Arc<dyn LevelVisibility> = Arc::new(StaticLevel::load_from_path(&level_path)?);
    let baked = load_baked(&baked_path)?;
    let mut manager = AmbientProbeManager::new(config);
    manager.load_level(Arc::clone(&level), &baked)?;
    let stats = manager.process_ambient_probes()?;
    println!(
        "Loaded {} ({} leaves, {} probes, {} lights, {} cubemaps)",
        level_path.display(),
        stats.leaves,
        manager.registry().probes().len(),
        manager.registry().lights().len(),
        manager.registry().cubemaps().len()
    );

    let material = MaterialLighting { stages: StageRoles::BASE_TEXTURE, wants_env_cubemap: true, own_envmap: false };
    let anchors: Vec<Vec3> = (0..level.leaf_count()).map(|leaf| level.leaf_center(LeafId(leaf as u32))).collect();
    let mut clock = FrameClock::fixed(options.step_or_default());
    let mut summary = FrameSummary { objects: anchors.len(), ..Default::default() };
    for _ in 0..options.frames_or_default() {
        clock.tick();
        let now = clock.now();
        let angle = now as f32 * 0.2;
        let eye = Vec3::new(angle.cos() * 10.0, 4.0, angle.sin() * 10.0);
        manager.xform_lights(&Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y), now);

        let updates: Vec<NodeUpdate> = anchors
            .iter()
            .enumerate()
            .map(|(index, anchor)| {
                let drift = Vec3::new((now as f32 + index as f32).sin() * 0.25, 0.0, 0.0);
                NodeUpdate::new(ObjectId(index as u64), Mat4::from_translation(*anchor + drift))
                    .with_material(material)
            })
            .collect();
        for lighting in manager.update_nodes(&updates) {
            if lighting.recomputed {
                summary.recomputed += 1;
            } else {
                summary.reused += 1;
            }
            if !lighting.degradation.is_empty() {
                summary.degraded += 1;
            }
            summary.max_lights = summary.max_lights.max(lighting.state.light_count);
        }
        summary.frames += 1;
    }

    println!(
        "Simulated {} frames for {} objects ({} recomputed, {} reused, {} degraded)",
        summary.frames, summary.objects, summary.recomputed, summary.reused, summary.degraded
    );
    let report = serde_json::json!({ "summary": summary, "metrics": manager.metrics() });
    println!("{}", serde_json::to_string_pretty(&report).context("Serializing probe report")?);
    Ok(())
}

#[cfg(feature = "binary_level")]
fn load_baked(path: &Path) -> Result<BakedLighting> {
    if path.extension().is_some_and(|ext| ext == "lz4") {
        return BakedLighting::load_binary(path);
    }
    BakedLighting::load_from_path(path)
}

#[cfg(not(feature = "binary_level"))]
fn load_baked(path: &Path) -> Result<BakedLighting> {
    BakedLighting::load_from_path(path)
}
