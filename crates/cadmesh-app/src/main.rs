//! CADMesh 命令行程序
//!
//! 细分 `.cmsh` 形体文件（或内置演示装配体），输出摘要或 JSON 数据。

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cadmesh_core::math::{Placement, Point3, Vector3};
use cadmesh_core::shape::Shape;
use cadmesh_file::load_shape;
use cadmesh_tess::assembly::{Color, Group, Part};
use cadmesh_tess::collector::RenderOutput;
use cadmesh_tess::config::{PoolConfig, RenderConfig};
use cadmesh_tess::renderer::Renderer;

/// 细分 `.cmsh` 形体文件，未给出文件时渲染内置演示装配体
#[derive(Debug, Parser)]
#[command(name = "cadmesh")]
#[command(about = "Tessellate CAD shapes into render meshes", long_about = None)]
#[command(version)]
struct Args {
    /// Load render configuration from a JSON file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Linear deflection relative to the bounding box size
    #[arg(long)]
    deviation: Option<f64>,

    /// Angular deflection in radians
    #[arg(long)]
    angular_tolerance: Option<f64>,

    /// Tessellate in worker processes
    #[arg(long)]
    parallel: bool,

    /// Number of worker processes
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Worker executable (default: cadmesh-worker next to this binary)
    #[arg(long, value_name = "PATH")]
    worker: Option<PathBuf>,

    /// Add the overall bounding box to the output
    #[arg(long)]
    show_bbox: bool,

    /// Print the JSON payload instead of a summary
    #[arg(long)]
    json: bool,

    /// Shape files to load, one part per file
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,
}

impl Args {
    /// 命令行选项覆盖配置文件中的值
    fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RenderConfig::default(),
        };
        if let Some(deviation) = self.deviation {
            config.deviation = deviation;
        }
        if let Some(angular_tolerance) = self.angular_tolerance {
            config.angular_tolerance = angular_tolerance;
        }
        if self.parallel {
            config.parallel = true;
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        if self.show_bbox {
            config.show_bbox = true;
        }
        config.validate()?;
        Ok(config)
    }
}

/// 加载形体文件，每个文件一个零件
fn load_assembly(files: &[PathBuf]) -> Result<Group> {
    let mut root = Group::new("Group");
    for path in files {
        let shape = load_shape(path).with_context(|| format!("failed to load {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shape".to_string());
        root.push(Part::new(name, shape));
    }
    Ok(root)
}

/// 演示装配体：面、线、点三类叶子和嵌套放置
fn demo_assembly() -> Result<Group> {
    let cube = Shape::cuboid(Point3::origin(), Point3::new(10.0, 10.0, 10.0))?;
    let cylinder = Shape::cylinder(Point3::origin(), 3.0, 12.0)?;
    let sphere = Shape::sphere(Point3::origin(), 4.0)?;
    let plate = Shape::polygon_with_holes(
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(20.0, 0.0, 0.0),
            Point3::new(20.0, 8.0, 0.0),
            Point3::new(0.0, 8.0, 0.0),
        ],
        &[vec![
            Point3::new(8.0, 2.0, 0.0),
            Point3::new(12.0, 2.0, 0.0),
            Point3::new(12.0, 6.0, 0.0),
            Point3::new(8.0, 6.0, 0.0),
        ]],
    )?;
    let path = Shape::wire(
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 0.0),
            Point3::new(10.0, 0.0, 5.0),
        ],
        false,
    )?;
    let ring = Shape::circle(Point3::origin(), 6.0)?;
    let points = Shape::vertices(
        (0..8)
            .map(|i| Point3::new(i as f64 * 2.0, 0.0, 20.0))
            .collect(),
    );

    let fixture = Group::new("fixture")
        .with_placement(Placement::new(
            Vector3::new(30.0, 0.0, 0.0),
            Vector3::z() * std::f64::consts::FRAC_PI_4,
        ))
        .with_child(Part::new("post", cylinder.clone()))
        .with_child(Part::new("post", cylinder).with_placement(Placement::translation(8.0, 0.0, 0.0)))
        .with_child(
            Part::new("ball", sphere)
                .with_placement(Placement::translation(4.0, 0.0, 16.0))
                .with_color(Color::new(0x40, 0x80, 0xff)),
        );

    Ok(Group::new("Group")
        .with_child(Part::new("base", cube.clone()))
        .with_child(
            Part::new("lid", cube)
                .with_placement(Placement::translation(0.0, 0.0, 12.0))
                .with_alpha(0.5),
        )
        .with_child(fixture)
        .with_child(Part::new("plate", plate).with_placement(Placement::translation(0.0, -12.0, 0.0)))
        .with_child(Part::new("path", path))
        .with_child(Part::new("ring", ring).with_placement(Placement::translation(-10.0, 0.0, 0.0)))
        .with_child(Part::new("markers", points)))
}

fn print_summary(output: &RenderOutput) {
    println!("bounding box: {}", output.bb);
    for part in output.shapes.parts_recursive() {
        let triangles = part.mesh.as_ref().map_or(0, |m| m.triangle_count());
        let segments = part.edges.as_ref().map_or(0, |e| e.total());
        let points = part.points.as_ref().map_or(0, |p| p.len() / 3);
        println!(
            "{:<32} {:>8} triangles {:>8} segments {:>6} points  accuracy {}",
            part.id, triangles, segments, points, part.accuracy
        );
    }
}

fn main() -> Result<()> {
    // 初始化日志
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(Level::INFO).finish(),
    )?;

    let args = Args::parse();

    let config = args.render_config()?;
    let root = if args.files.is_empty() {
        info!("No input files, rendering the demo assembly");
        demo_assembly()?
    } else {
        load_assembly(&args.files)?
    };

    let mut renderer = Renderer::new(config)?;
    if let Some(program) = &args.worker {
        let workers = renderer.config().worker_count();
        renderer = renderer.with_pool_config(PoolConfig::new(program, workers));
    }

    let output = renderer.render(&root)?;
    renderer.shutdown();

    if args.json {
        println!("{}", serde_json::to_string(&output.to_json())?);
    } else {
        print_summary(&output);
    }

    Ok(())
}
