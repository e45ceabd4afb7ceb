//! Headless tour of the board engine and render pipeline.
//!
//! Seeds a small board through the engine, persists it into the
//! in-memory repo, then drives two seconds of frames with a logging
//! backend standing in for a real surface. Run with
//! `RUST_LOG=debug cargo run -p murale-render --example headless`.

use kurbo::{Point, Size};
use log::{debug, info};
use murale_core::repo::{ElementRepo, MemoryRepo};
use murale_core::sync::{CommandOutcome, StoreOp};
use murale_core::{BoardEngine, ElementPatch, ElementType};
use murale_render::{
    RenderBackend, RenderContext, RenderDriver, RenderError, RenderPipeline, Scene,
};
use uuid::Uuid;

const VIEWPORT: Size = Size::new(1280.0, 800.0);

struct LoggingBackend {
    frames: u64,
}

impl RenderBackend for LoggingBackend {
    fn submit(&mut self, scene: &Scene, surface_size: Size) -> Result<(), RenderError> {
        self.frames += 1;
        debug!(
            "frame {}: {} draw items at {:.0}x{:.0}",
            self.frames,
            scene.len(),
            surface_size.width,
            surface_size.height
        );
        Ok(())
    }
}

/// Drain queued persistence commands into the repo and feed the
/// outcomes back, the way a host adapter would.
fn pump(engine: &mut BoardEngine, repo: &MemoryRepo) {
    for command in engine.take_commands() {
        let outcome = match command.op {
            StoreOp::Insert(row) => match pollster::block_on(repo.insert(row)) {
                Ok(row) => CommandOutcome::Inserted {
                    seq: command.seq,
                    row,
                },
                Err(error) => CommandOutcome::Failed {
                    seq: command.seq,
                    error,
                },
            },
            StoreOp::Update { id, patch } => match pollster::block_on(repo.update(id, patch)) {
                Ok(()) => CommandOutcome::Completed { seq: command.seq },
                Err(error) => CommandOutcome::Failed {
                    seq: command.seq,
                    error,
                },
            },
            StoreOp::Delete { id } => match pollster::block_on(repo.delete(id)) {
                Ok(()) => CommandOutcome::Completed { seq: command.seq },
                Err(error) => CommandOutcome::Failed {
                    seq: command.seq,
                    error,
                },
            },
        };
        engine.apply_outcome(outcome);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let board = Uuid::new_v4();
    let user = Uuid::new_v4();
    let repo = MemoryRepo::new();
    let mut engine = BoardEngine::new(board, user);

    let _frame = engine.create(ElementType::Frame, 80.0, 80.0, Some(520.0), Some(360.0));
    let plan = engine.create(ElementType::Sticky, 120.0, 140.0, None, None);
    let build = engine.create(ElementType::Sticky, 360.0, 260.0, None, None);
    let outline = engine.create(ElementType::Rectangle, 760.0, 160.0, None, None);
    engine.create_connector(plan, build)?;

    let stroke = [
        Point::new(820.0, 420.0),
        Point::new(860.0, 380.0),
        Point::new(920.0, 430.0),
        Point::new(980.0, 390.0),
    ];
    engine.create_freehand(&stroke, None)?;

    engine.open_text_editor(plan);
    engine.commit_text("plan the launch");
    engine.open_text_editor(build);
    engine.commit_text("build the deck");
    if engine.update(
        outline,
        ElementPatch {
            x: Some(720.0),
            ..ElementPatch::default()
        },
    ) {
        debug!("nudged the outline box");
    }

    // Two passes: the creates confirm first, then the edits deferred
    // behind them flush under their server ids.
    pump(&mut engine, &repo);
    pump(&mut engine, &repo);
    // Single client; nobody is listening on the peer channel.
    let _ = engine.take_broadcasts();

    engine.fit_to_content(VIEWPORT, 64.0);

    let mut pipeline = RenderPipeline::new();
    let mut backend = LoggingBackend { frames: 0 };
    let mut driver = RenderDriver::new();
    driver.start();

    for now_ms in (0u64..2000).step_by(16) {
        let Some(dt) = driver.poll(now_ms) else {
            continue;
        };
        engine.tick(now_ms, dt);
        let ctx = RenderContext::for_engine(&engine, VIEWPORT);
        pipeline.build_frame(&ctx);
        backend.submit(pipeline.scene(), ctx.surface_size())?;
        for event in engine.take_events() {
            info!("engine event: {event:?}");
        }
    }
    driver.stop();

    let stats = pipeline.stats();
    info!(
        "rendered {} frames; last frame drew {}/{} elements ({} connectors, {} culled), {} draw items",
        backend.frames,
        stats.elements_drawn,
        stats.elements_total,
        stats.connectors_drawn,
        stats.elements_culled,
        stats.draw_items
    );
    Ok(())
}
