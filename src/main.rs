// =============================================================================
// VULKAN BRING-UP - Learning Project
// =============================================================================
//
// Opens a window and brings Vulkan up to the point where a frame loop could
// start: instance, surface, GPU, queues, swapchain, image views, command
// pools/buffers and per-image sync objects. Then it idles until the window
// closes and tears everything down in reverse order.
//
// OWNERSHIP OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Process teardown stack                                         │
// │    instance → debug messenger → window → surface                │
// │  DeviceContext teardown stack                                   │
// │    device → swapchain → image views → command pools → sync      │
// └─────────────────────────────────────────────────────────────────┘
//
// The device stack is emptied first, then the process stack, each newest
// entry first.
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use backend::{DeviceContext, DeviceSettings, InstanceContext, TeardownStack};
use config::Config;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let (config, load_error) = Config::load();

    // Initialize logging
    init_logging(&config, load_error);
    log::info!("Starting Vulkan bring-up");
    log::info!("Window: {}x{}", config.window.width, config.window.height);
    log::info!("Preferred present mode: {}", config.vulkan.present_mode);

    let event_loop = EventLoop::new()?;
    // Nothing is rendered, so only wake up for events
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.finish()
}

/// Initialize logging; `RUST_LOG` overrides the configured level.
///
/// Config problems found before the logger existed are reported here.
fn init_logging(config: &Config, load_error: Option<anyhow::Error>) {
    let level = config.log_level();
    env_logger::Builder::new()
        .filter_level(*level.as_ref().unwrap_or(&log::LevelFilter::Info))
        .parse_default_env()
        .init();

    if let Some(e) = load_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    if level.is_err() {
        log::warn!("Unknown log level '{}', defaulting to info", config.debug.log_level);
    }
    log::debug!("Config: {:?}", config);
}

/// Acquire the process-scope objects so that LIFO release runs surface,
/// window, then whatever `instance` pushed (debug messenger, instance).
///
/// The window's release is pushed here; `instance` and `surface` push their own.
fn acquire_process_scope<I, W, S>(
    teardown: &mut TeardownStack,
    instance: impl FnOnce(&mut TeardownStack) -> Result<I>,
    window: impl FnOnce() -> Result<W>,
    surface: impl FnOnce(&I, &W, &mut TeardownStack) -> Result<S>,
) -> Result<(I, W, S)>
where
    W: Clone + 'static,
{
    let instance = instance(teardown)?;

    let window = window()?;
    {
        // The stack holds the only long-lived reference
        let window = window.clone();
        teardown.push("window", move || drop(window));
    }

    let surface = surface(&instance, &window, teardown)?;
    Ok((instance, window, surface))
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Everything that exists while the window is open.
///
/// The device context must be gone before the process stack runs, because
/// the device stack's entries rely on the surface and instance.
struct Session {
    window_id: WindowId,
    device: Option<DeviceContext>,
    instance: InstanceContext,
    teardown: TeardownStack,
}

impl Session {
    /// Create the window and run the full bring-up sequence.
    ///
    /// On error every resource acquired so far is released before returning.
    fn start(event_loop: &ActiveEventLoop, config: &Config) -> Result<Self> {
        let mut teardown = TeardownStack::new();

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance, window, surface
        // ─────────────────────────────────────────────────────────────────────
        let window_attributes = WindowAttributes::default()
            .with_title(&config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                config.window.width,
                config.window.height,
            ));

        // Enable validation layers based on config (and debug build)
        let enable_validation = cfg!(debug_assertions) && config.vulkan.validation;

        // The event loop knows the window system, so the instance comes first
        let (instance, window, surface) = acquire_process_scope(
            &mut teardown,
            |teardown: &mut TeardownStack| {
                InstanceContext::new(event_loop, &config.window.title, enable_validation, teardown)
                    .context("Instance bring-up failed")
            },
            || {
                let window = event_loop
                    .create_window(window_attributes)
                    .context("Failed to create window")?;
                Ok(Arc::new(window))
            },
            |instance: &InstanceContext, window: &Arc<Window>, teardown: &mut TeardownStack| {
                instance
                    .create_surface(&**window, teardown)
                    .context("Surface creation failed")
            },
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Device and everything below it
        // ─────────────────────────────────────────────────────────────────────
        let settings = DeviceSettings {
            preferred_present_mode: config.present_mode(),
            ..DeviceSettings::default()
        };
        let device = DeviceContext::new(&instance, surface, &settings).context("Device bring-up failed")?;

        log::info!(
            "Bring-up complete: {} process and {} device release actions registered",
            teardown.len(),
            device.release_action_count()
        );
        log::info!("{}", device.summary());
        if !instance.validation && config.vulkan.validation {
            log::info!("Running without validation layers");
        }

        Ok(Self {
            window_id: window.id(),
            device: Some(device),
            instance,
            teardown,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(device) = self.device.take() {
            device.destroy();
        }
        log::debug!(
            "Releasing process scope: {:?} (instance had {} GPU(s))",
            self.teardown,
            self.instance.physical_devices.len()
        );
        self.teardown.release_all();

        log::info!("Cleanup complete");
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

struct App {
    config: Config,
    session: Option<Session>,
    /// Bring-up failure, reported from `main` once the event loop stops
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            session: None,
            failure: None,
        }
    }

    fn shut_down(&mut self, event_loop: &ActiveEventLoop) {
        self.session = None;
        event_loop.exit();
    }

    /// Tear down whatever is left and surface a bring-up failure
    fn finish(mut self) -> Result<()> {
        self.session = None;
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Bring-up runs once per process
        if self.session.is_some() || self.failure.is_some() {
            return;
        }

        match Session::start(event_loop, &self.config) {
            Ok(session) => {
                log::info!("Waiting for the window to close");
                self.session = Some(session);
            }
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:#}", e);
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    /// Handle window events.
    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.session.as_ref().map(|s| s.window_id) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shut_down(event_loop);
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.shut_down(event_loop);
                }
            }

            _ => {}
        }
    }
}
