//! vkframe demo - clears an 800x600 window through the full frame cycle.
//!
//! Runs until the window is closed, or for `--frames N` frames. Settings
//! come from `VKFRAME_*` environment variables.

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkframe_core::{Config, FrameTimer};
use vkframe_platform::Window;
use vkframe_renderer::Renderer;
use vkframe_renderer::frame::FrameStatus;

const DEMO_WIDTH: u32 = 800;
const DEMO_HEIGHT: u32 = 600;

struct App {
    config: Config,
    frame_limit: Option<u64>,
    window: Option<Window>,
    renderer: Option<Renderer>,
    timer: FrameTimer,
}

impl App {
    fn new(config: Config, frame_limit: Option<u64>) -> Self {
        Self {
            config,
            frame_limit,
            window: None,
            renderer: None,
            timer: FrameTimer::new(),
        }
    }

    /// Runs one frame. Returns false when the loop should stop.
    fn draw(&mut self) -> bool {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return true;
        };

        renderer.set_minimized(window.is_minimized());
        let result = renderer.begin_frame().and_then(|status| match status {
            FrameStatus::Recording => {
                renderer.end_frame()?;
                renderer.present().map(Some)
            }
            FrameStatus::Rebuilt | FrameStatus::Skipped => Ok(None),
        });

        match result {
            Ok(Some(_)) => {
                self.timer.tick();
                let frames = renderer.frame_state().frame_counter;
                self.frame_limit.is_none_or(|limit| frames < limit)
            }
            Ok(None) => true,
            Err(e) if e.is_fatal() => {
                error!("Fatal render error: {}", e);
                false
            }
            Err(e) => {
                warn!("Frame skipped: {}", e);
                true
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                error!("Renderer shutdown failed: {}", e);
            }
            info!(
                "Rendered {} frame(s), {:.1} fps average",
                renderer.frame_state().frame_counter,
                self.timer.average_fps()
            );
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(
            event_loop,
            self.config.width,
            self.config.height,
            &self.config.title,
        ) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&self.config, &window) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.resize(size.width, size.height)
                {
                    error!("Resize to {}x{} failed: {}", size.width, size.height, e);
                }
            }
            WindowEvent::RedrawRequested => {
                if !self.draw() {
                    self.shutdown();
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// Parses `--frames N`.
fn parse_frame_limit(mut args: impl Iterator<Item = String>) -> Result<Option<u64>> {
    let mut limit = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args.next().context("--frames needs a value")?;
                let frames = value
                    .parse::<u64>()
                    .with_context(|| format!("invalid frame count '{value}'"))?;
                limit = Some(frames);
            }
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(limit)
}

fn main() -> Result<()> {
    let config = Config::default()
        .with_title("vkframe demo")
        .with_size(DEMO_WIDTH, DEMO_HEIGHT)
        .with_overrides(|key| std::env::var(key).ok())?;
    vkframe_core::init_logging_with(&config.log_filter);

    let frame_limit = parse_frame_limit(std::env::args().skip(1))?;
    info!(
        "Starting vkframe demo at {}x{}{}",
        config.width,
        config.height,
        frame_limit.map_or(String::new(), |n| format!(" for {n} frame(s)"))
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, frame_limit);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_frame_limit() {
        assert_eq!(parse_frame_limit(args(&[])).unwrap(), None);
        assert_eq!(parse_frame_limit(args(&["--frames", "3"])).unwrap(), Some(3));
        assert!(parse_frame_limit(args(&["--frames"])).is_err());
        assert!(parse_frame_limit(args(&["--frames", "x"])).is_err());
        assert!(parse_frame_limit(args(&["--fast"])).is_err());
    }
}
