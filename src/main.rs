///
/// Enable debug logging: $env:RUST_LOG="debug"
///

mod app;

use std::fs;

use anyhow::Result;
use log::*;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use app::assets;

/// Decodes the on-disk assets, falling back to built-in geometry and pixels
/// when they are absent. The shader bytecode is mandatory.
fn load_scene() -> Result<app::Scene> {
    let pixels = match assets::load_png("assets/texture.png") {
        Ok(pixels) => pixels,
        Err(e) => {
            warn!("Using the built-in texture: {}", e);
            assets::checkerboard()
        }
    };

    let (vertices, indices) = match assets::load_obj("assets/model.obj") {
        Ok(mesh) => mesh,
        Err(e) => {
            warn!("Using the built-in quad: {}", e);
            assets::quad()
        }
    };

    Ok(app::Scene {
        pixels,
        vertices,
        indices,
        vert_spv: fs::read("shaders/vert.spv")?,
        frag_spv: fs::read("shaders/frag.spv")?,
    })
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    info!("Creating app...");

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("Vulkan Rust")
        .with_inner_size(LogicalSize::new(1024, 768))
        .build(&event_loop)?;

    let scene = load_scene()?;
    let mut app = unsafe { app::App::create(&window, &scene)? };
    let mut destroying = false;
    let mut minimized = false;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {

            Event::MainEventsCleared if !destroying && !minimized => {
                unsafe { app.run_frame(&window) }.unwrap()
            }

            Event::WindowEvent { event: WindowEvent::Resized(size), .. } => {
                if size.width == 0 || size.height == 0 {
                    minimized = true;
                } else {
                    minimized = false;
                    app.notify_resize();
                }
            }

            Event::WindowEvent { event: WindowEvent::CloseRequested, .. } => {
                destroying = true;
                *control_flow = ControlFlow::Exit;
                unsafe { app.destroy(); }
            }

            _ => {}
        }
    });
}
