//! 装配体收集器
//!
//! 深度优先遍历装配体树，分三个阶段生成输出：
//! 1. 前序遍历：组合放置、估算精度、向后端提交每个叶子
//! 2. 取回所有待定结果（并行模式下全部分发完之后才开始等待）
//! 3. 后序合并包围盒：子节点的包围盒并入父节点后从子节点删除，只有根节点保留

use crate::assembly::{Group, Node, Part};
use crate::backend::{LeafMesh, TessRequest, TessellationBackend};
use crate::cache::MeshCache;
use crate::config::RenderConfig;
use crate::error::{Result, TessError};
use crate::payload::{
    unique_name, GroupPayload, PartPayload, PartType, PayloadNode, States, VisibilityState,
};
use crate::progress::ProgressReporter;
use crate::quality;
use crate::timer::Timer;
use cadmesh_core::math::{BoundingBox, Placement};
use cadmesh_core::shape::ShapeKind;
use std::collections::HashSet;

/// 收集结果
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// 嵌套数据，根节点携带总包围盒
    pub shapes: GroupPayload,
    /// 扁平状态表
    pub states: States,
    /// 总包围盒
    pub bb: BoundingBox,
}

impl RenderOutput {
    /// 序列化为显示层使用的 JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "shapes": self.shapes,
            "states": self.states,
        })
    }
}

/// 阶段 1 产生的中间节点
enum Draft {
    Group {
        id: String,
        name: String,
        children: Vec<Draft>,
    },
    Part(PartDraft),
}

struct PartDraft {
    id: String,
    name: String,
    request: TessRequest,
    color: crate::assembly::Color,
    alpha: f32,
    optimal_bb: bool,
    mesh: LeafMesh,
}

struct Walker<'a, B: ?Sized> {
    config: &'a RenderConfig,
    backend: &'a mut B,
    cache: &'a mut MeshCache,
    progress: &'a mut dyn ProgressReporter,
    states: States,
    leaves: usize,
}

/// 收集装配体树
pub fn collect<B>(
    root: &Group,
    config: &RenderConfig,
    backend: &mut B,
    cache: &mut MeshCache,
    progress: &mut dyn ProgressReporter,
) -> Result<RenderOutput>
where
    B: TessellationBackend + ?Sized,
{
    let mut walker = Walker {
        config,
        backend,
        cache,
        progress,
        states: States::new(),
        leaves: 0,
    };

    let root_id = format!("/{}", root.name);
    let mut draft = {
        let _t = Timer::new(config.timeit, "collect: dispatch");
        walker.walk_group(root, &Placement::identity(), root_id)?
    };

    {
        let _t = Timer::new(config.timeit, "collect: resolve");
        walker.resolve(&mut draft)?;
    }

    let _t = Timer::new(config.timeit, "collect: bounding boxes");
    let shapes = match finish(draft)? {
        PayloadNode::Group(g) => g,
        PayloadNode::Part(_) => {
            return Err(TessError::GeometryConsistency(
                "root of the assembly must be a group".to_string(),
            ))
        }
    };
    let bb = shapes.bb.unwrap_or_default();

    tracing::debug!("Collected {} leaves, bb {}", walker.leaves, bb);

    Ok(RenderOutput {
        shapes,
        states: walker.states,
        bb,
    })
}

impl<B: TessellationBackend + ?Sized> Walker<'_, B> {
    // ========== 阶段 1 ==========

    fn walk_group(&mut self, group: &Group, inherited: &Placement, id: String) -> Result<Draft> {
        let combined = match &group.placement {
            Some(p) => inherited * p,
            None => *inherited,
        };

        let mut used = HashSet::new();
        let mut children = Vec::with_capacity(group.children.len());
        for child in &group.children {
            match child {
                Node::Group(g) => {
                    let child_id = format!("{}/{}", id, unique_name(&mut used, &g.name));
                    children.push(self.walk_group(g, &combined, child_id)?);
                }
                Node::Part(p) => {
                    let child_id = format!("{}/{}", id, unique_name(&mut used, &p.name));
                    children.push(self.submit_part(p, &combined, child_id)?);
                }
            }
        }

        Ok(Draft::Group {
            id,
            name: group.name.clone(),
            children,
        })
    }

    fn submit_part(&mut self, part: &Part, inherited: &Placement, id: String) -> Result<Draft> {
        let kind = part.shape.kind();
        let request = TessRequest {
            shape: part.shape.clone(),
            placement: inherited * part.placement,
            params: quality::estimate(&part.shape, self.config),
        };

        let mesh = self.backend.submit(&request, self.cache)?;
        self.progress.update(1);
        self.leaves += 1;

        tracing::debug!(
            "Submitted {} ({:?}, quality {}, {})",
            id,
            kind,
            request.params.quality,
            match &mesh {
                LeafMesh::Ready(_) => "ready".to_string(),
                LeafMesh::Pending(h) => format!("pending {}", h),
            }
        );

        let face_state = match kind {
            ShapeKind::Faces => {
                VisibilityState::from_visible(self.config.render_faces && part.show_faces)
            }
            ShapeKind::Edges | ShapeKind::Vertices => VisibilityState::Empty,
        };
        let edge_state = VisibilityState::from_visible(
            part.show_edges && (self.config.render_edges || kind != ShapeKind::Faces),
        );
        self.states.insert(id.clone(), [face_state, edge_state]);

        let color = part.color.unwrap_or(match kind {
            ShapeKind::Faces => self.config.default_color,
            ShapeKind::Edges | ShapeKind::Vertices => self.config.default_edge_color,
        });

        Ok(Draft::Part(PartDraft {
            id,
            name: part.name.clone(),
            request,
            color,
            alpha: part.alpha,
            optimal_bb: self.config.optimal_bb,
            mesh,
        }))
    }

    // ========== 阶段 2 ==========

    fn resolve(&mut self, draft: &mut Draft) -> Result<()> {
        match draft {
            Draft::Group { children, .. } => {
                for child in children {
                    self.resolve(child)?;
                }
            }
            Draft::Part(part) => {
                if let LeafMesh::Pending(handle) = &part.mesh {
                    let result = self.backend.resolve(handle, self.cache)?;
                    part.mesh = LeafMesh::Ready(result);
                    self.progress.update(1);
                }
            }
        }
        Ok(())
    }
}

// ========== 阶段 3 ==========

fn finish(draft: Draft) -> Result<PayloadNode> {
    match draft {
        Draft::Group { id, name, children } => {
            let mut bb: Option<BoundingBox> = None;
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                let mut node = finish(child)?;
                let child_bb = match &mut node {
                    PayloadNode::Group(g) => g.bb.take(),
                    PayloadNode::Part(p) => p.bb.take(),
                };
                if let Some(child_bb) = child_bb {
                    bb = Some(match bb {
                        Some(b) => b.merged(&child_bb),
                        None => child_bb,
                    });
                }
                parts.push(node);
            }
            Ok(PayloadNode::Group(GroupPayload {
                id,
                name,
                parts,
                bb,
            }))
        }
        Draft::Part(part) => finish_part(part).map(PayloadNode::Part),
    }
}

fn finish_part(part: PartDraft) -> Result<PartPayload> {
    let result = match part.mesh {
        LeafMesh::Ready(result) => result,
        LeafMesh::Pending(handle) => return Err(TessError::UnknownHandle(handle.name().to_string())),
    };

    let request = &part.request;
    let bb = if part.optimal_bb {
        request.shape.bounding_box(&request.placement, true)
    } else {
        result
            .bounds
            .or_else(|| result.edges.as_ref().and_then(|e| e.bounds()))
            .or_else(|| result.points.as_ref().and_then(|p| BoundingBox::from_flat(p)))
            .or_else(|| request.shape.bounding_box(&request.placement, false))
    };

    let kind = match request.shape.kind() {
        ShapeKind::Faces => PartType::Shapes,
        ShapeKind::Edges => PartType::Edges,
        ShapeKind::Vertices => PartType::Vertices,
    };

    Ok(PartPayload {
        id: part.id,
        name: part.name,
        kind,
        mesh: result.mesh.clone(),
        edges: result.edges.clone(),
        points: result.points.clone(),
        color: part.color,
        alpha: part.alpha,
        accuracy: request.params.quality,
        bb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Color;
    use crate::backend::SequentialTessellator;
    use crate::coordinator::PendingHandle;
    use crate::mesh::TessResult;
    use crate::progress::NullProgress;
    use crate::tessellator::tessellate;
    use cadmesh_core::math::Point3;
    use cadmesh_core::shape::Shape;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn unit_cube() -> Shape {
        Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    fn two_cubes() -> Group {
        let cube = unit_cube();
        Group::new("Group")
            .with_child(Part::new("a", cube.clone()))
            .with_child(Part::new("b", cube).with_placement(Placement::translation(2.0, 2.0, 2.0)))
    }

    #[derive(Default)]
    struct CountingProgress {
        steps: usize,
    }

    impl ProgressReporter for CountingProgress {
        fn update(&mut self, n: usize) {
            self.steps += n;
        }
    }

    /// 所有叶子都返回待定句柄的后端，记录调用顺序
    #[derive(Default)]
    struct RecordingBackend {
        events: Vec<String>,
        requests: HashMap<String, TessRequest>,
    }

    impl TessellationBackend for RecordingBackend {
        fn submit(&mut self, request: &TessRequest, _cache: &mut MeshCache) -> Result<LeafMesh> {
            let name = format!("job{}", self.requests.len());
            self.events.push(format!("submit {}", name));
            self.requests.insert(name.clone(), request.clone());
            Ok(LeafMesh::Pending(PendingHandle::new(name)))
        }

        fn resolve(
            &mut self,
            handle: &PendingHandle,
            _cache: &mut MeshCache,
        ) -> Result<Arc<TessResult>> {
            self.events.push(format!("resolve {}", handle.name()));
            let request = self
                .requests
                .get(handle.name())
                .ok_or_else(|| TessError::UnknownHandle(handle.name().to_string()))?;
            Ok(Arc::new(tessellate(
                &request.shape,
                &request.placement,
                &request.params,
            )?))
        }

        fn is_parallel(&self) -> bool {
            true
        }
    }

    /// 提交即失败的后端
    struct FailingBackend;

    impl TessellationBackend for FailingBackend {
        fn submit(&mut self, _request: &TessRequest, _cache: &mut MeshCache) -> Result<LeafMesh> {
            Err(TessError::WorkerFailure("boom".to_string()))
        }

        fn resolve(
            &mut self,
            handle: &PendingHandle,
            _cache: &mut MeshCache,
        ) -> Result<Arc<TessResult>> {
            Err(TessError::UnknownHandle(handle.name().to_string()))
        }
    }

    #[test]
    fn test_two_cubes_end_to_end() {
        let mut cache = MeshCache::new();
        let output = collect(
            &two_cubes(),
            &RenderConfig::default(),
            &mut SequentialTessellator,
            &mut cache,
            &mut NullProgress,
        )
        .unwrap();

        assert_eq!(output.bb.to_array(), [0.0, 3.0, 0.0, 3.0, 0.0, 3.0]);
        assert_eq!(output.shapes.bb, Some(output.bb));
        assert_eq!(output.states.len(), 2);
        assert_eq!(
            output.states["/Group/a"],
            [VisibilityState::Selected, VisibilityState::Selected]
        );
        // 只有根节点携带包围盒
        assert!(output.shapes.parts.iter().all(|p| p.bb().is_none()));

        let parts = output.shapes.parts_recursive();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].id, "/Group/b");
        assert_eq!(parts[0].color, Color::new(232, 176, 36));
        assert!(parts[0].mesh.is_some());
    }

    #[test]
    fn test_shared_shape_hits_cache() {
        let cube = unit_cube();
        let root = Group::new("root")
            .with_child(Part::new("a", cube.clone()))
            .with_child(Part::new("a", cube));
        let mut cache = MeshCache::new();
        let output = collect(
            &root,
            &RenderConfig::default(),
            &mut SequentialTessellator,
            &mut cache,
            &mut NullProgress,
        )
        .unwrap();

        assert_eq!(cache.stats().hits, 1);
        assert!(output.states.contains_key("/root/a"));
        assert!(output.states.contains_key("/root/a_1"));
    }

    #[test]
    fn test_dispatch_before_resolve() {
        let cube = unit_cube();
        let root = Group::new("root")
            .with_child(Part::new("a", cube.clone()))
            .with_child(
                Group::new("sub")
                    .with_child(Part::new("b", cube.clone()))
                    .with_child(Part::new("c", cube)),
            );

        let mut backend = RecordingBackend::default();
        let mut progress = CountingProgress::default();
        let output = collect(
            &root,
            &RenderConfig::default(),
            &mut backend,
            &mut MeshCache::new(),
            &mut progress,
        )
        .unwrap();

        let first_resolve = backend
            .events
            .iter()
            .position(|e| e.starts_with("resolve"))
            .unwrap();
        let last_submit = backend
            .events
            .iter()
            .rposition(|e| e.starts_with("submit"))
            .unwrap();
        assert!(last_submit < first_resolve);
        assert_eq!(backend.events.len(), 6);
        assert_eq!(progress.steps, 6);
        assert_eq!(output.states.len(), 3);
        assert!(output.states.contains_key("/root/sub/c"));
    }

    #[test]
    fn test_group_placement_composition() {
        let root = Group::new("root").with_child(
            Group::new("moved")
                .with_placement(Placement::translation(10.0, 0.0, 0.0))
                .with_child(
                    Part::new("cube", unit_cube())
                        .with_placement(Placement::translation(0.0, 5.0, 0.0)),
                ),
        );
        let output = collect(
            &root,
            &RenderConfig::default(),
            &mut SequentialTessellator,
            &mut MeshCache::new(),
            &mut NullProgress,
        )
        .unwrap();

        assert_eq!(output.bb.to_array(), [10.0, 11.0, 5.0, 6.0, 0.0, 1.0]);
        match &output.shapes.parts[0] {
            PayloadNode::Group(g) => {
                assert_eq!(g.id, "/root/moved");
                assert!(g.bb.is_none());
            }
            PayloadNode::Part(_) => panic!("expected a group"),
        }
    }

    #[test]
    fn test_edge_and_vertex_leaves() {
        let wire = Shape::wire(
            &[Point3::origin(), Point3::new(4.0, 0.0, 0.0), Point3::new(4.0, 1.0, 0.0)],
            false,
        )
        .unwrap();
        let cloud = Shape::vertices(vec![Point3::new(-1.0, -1.0, -1.0), Point3::origin()]);
        let root = Group::new("root")
            .with_child(Part::new("wire", wire))
            .with_child(Part::new("cloud", cloud));

        let config = RenderConfig::default();
        let output = collect(
            &root,
            &config,
            &mut SequentialTessellator,
            &mut MeshCache::new(),
            &mut NullProgress,
        )
        .unwrap();

        assert_eq!(
            output.states["/root/wire"],
            [VisibilityState::Empty, VisibilityState::Selected]
        );
        let parts = output.shapes.parts_recursive();
        assert_eq!(parts[0].kind, PartType::Edges);
        assert_eq!(parts[0].edges.as_ref().unwrap().free.len(), 2);
        assert_eq!(parts[0].color, config.default_edge_color);
        assert_eq!(parts[1].kind, PartType::Vertices);
        assert_eq!(parts[1].points.as_ref().unwrap().len(), 6);
        assert_eq!(output.bb.to_array(), [-1.0, 4.0, -1.0, 1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_hidden_faces_state() {
        let root = Group::new("root")
            .with_child(Part::new("cube", unit_cube()).with_visibility(false, true));
        let config = RenderConfig {
            render_edges: false,
            ..Default::default()
        };
        let output = collect(
            &root,
            &config,
            &mut SequentialTessellator,
            &mut MeshCache::new(),
            &mut NullProgress,
        )
        .unwrap();
        assert_eq!(
            output.states["/root/cube"],
            [VisibilityState::Unselected, VisibilityState::Unselected]
        );
        assert!(output.shapes.parts_recursive()[0].edges.is_none());
    }

    #[test]
    fn test_optimal_bounding_box() {
        let rotated = Placement::new(
            cadmesh_core::math::Vector3::zeros(),
            cadmesh_core::math::Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_4),
        );
        let root = Group::new("root").with_child(
            Part::new("cyl", Shape::cylinder(Point3::origin(), 1.0, 1.0).unwrap())
                .with_placement(rotated),
        );
        let run = |optimal_bb: bool| {
            let config = RenderConfig {
                optimal_bb,
                render_faces: false,
                render_edges: false,
                ..Default::default()
            };
            collect(
                &root,
                &config,
                &mut SequentialTessellator,
                &mut MeshCache::new(),
                &mut NullProgress,
            )
            .unwrap()
            .bb
        };

        let loose = run(false);
        let tight = run(true);
        assert!(tight.xmax < loose.xmax);
        assert!((tight.xmax - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_failure_aborts_render() {
        let result = collect(
            &two_cubes(),
            &RenderConfig::default(),
            &mut FailingBackend,
            &mut MeshCache::new(),
            &mut NullProgress,
        );
        assert!(matches!(result, Err(TessError::WorkerFailure(_))));
    }

    #[test]
    fn test_empty_root() {
        let output = collect(
            &Group::new("empty"),
            &RenderConfig::default(),
            &mut SequentialTessellator,
            &mut MeshCache::new(),
            &mut NullProgress,
        )
        .unwrap();
        assert!(output.states.is_empty());
        assert!(output.shapes.bb.is_none());
        assert_eq!(output.bb, BoundingBox::default());
    }
}
