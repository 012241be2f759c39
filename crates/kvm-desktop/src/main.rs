//! KVM Desktop - INDY-3 fantasy console with minifb rendering
//!
//! The window is the VM's host: ROM present syscalls draw into it and
//! input syscalls sample its keyboard and mouse.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kvm_core::gpu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use kvm_core::input::{InputSnapshot, Key, MouseState};
use kvm_core::{Frame, Host, Kvm, KvmConfig, RomRegion, StepOutcome};
use log::{error, info};
use minifb::{MouseButton, MouseMode, Window, WindowOptions};

/// INDY-3 Desktop App
#[derive(Parser, Debug)]
#[command(name = "kvm-desktop")]
#[command(about = "Play an INDY-3 ROM in a window", long_about = None)]
struct Args {
    /// Path to the instruction ROM
    #[arg(short, long)]
    rom: PathBuf,

    /// Directory searched for named assets
    #[arg(short, long, default_value = ".")]
    assets: PathBuf,

    /// Screen scale factor (1-4)
    #[arg(short, long, default_value = "3")]
    scale: usize,

    /// CPU cycles executed per window update
    #[arg(short, long, default_value = "20000")]
    cycles_per_frame: i64,
}

/// minifb window acting as the VM host
struct WindowHost {
    window: Window,
    scale: usize,
    buffer: Vec<u32>,
    presented: bool,
}

impl WindowHost {
    fn new(scale: usize) -> Result<Self> {
        let mut window = Window::new(
            "INDY-3",
            SCREEN_WIDTH * scale,
            SCREEN_HEIGHT * scale,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .context("failed to create window")?;
        window.set_target_fps(60);
        Ok(Self {
            window,
            scale,
            buffer: Frame::new().scaled(scale),
            presented: false,
        })
    }

    /// Push the current buffer to the window, pumping its events
    fn redraw(&mut self) {
        let width = SCREEN_WIDTH * self.scale;
        let height = SCREEN_HEIGHT * self.scale;
        if let Err(e) = self.window.update_with_buffer(&self.buffer, width, height) {
            error!("window update failed: {}", e);
        }
    }
}

impl Host for WindowHost {
    fn present(&mut self, frame: &Frame) {
        // minifb takes 0x00RRGGBB, same as the frame
        self.buffer = frame.scaled(self.scale);
        self.redraw();
        self.presented = true;
    }

    fn sample_input(&mut self) -> InputSnapshot {
        let keys_down = self.window.get_keys().into_iter().filter_map(map_key).collect();
        let (x, y) = self
            .window
            .get_mouse_pos(MouseMode::Clamp)
            .map(|(x, y)| {
                let (width, height) = self.window.get_size();
                MouseState::from_window(x, y, width as f32, height as f32)
            })
            .unwrap_or((0, 0));
        let mouse = MouseState::new(
            x,
            y,
            self.window.get_mouse_down(MouseButton::Left),
            self.window.get_mouse_down(MouseButton::Middle),
            self.window.get_mouse_down(MouseButton::Right),
        );
        InputSnapshot { keys_down, mouse }
    }
}

/// Map a minifb key onto the INDY-3 keyboard layout
fn map_key(key: minifb::Key) -> Option<Key> {
    use minifb::Key as K;
    let mapped = match key {
        K::Key0 => Key::Num0,
        K::Key1 => Key::Num1,
        K::Key2 => Key::Num2,
        K::Key3 => Key::Num3,
        K::Key4 => Key::Num4,
        K::Key5 => Key::Num5,
        K::Key6 => Key::Num6,
        K::Key7 => Key::Num7,
        K::Key8 => Key::Num8,
        K::Key9 => Key::Num9,
        K::A => Key::A,
        K::B => Key::B,
        K::C => Key::C,
        K::D => Key::D,
        K::E => Key::E,
        K::F => Key::F,
        K::G => Key::G,
        K::H => Key::H,
        K::I => Key::I,
        K::J => Key::J,
        K::K => Key::K,
        K::L => Key::L,
        K::M => Key::M,
        K::N => Key::N,
        K::O => Key::O,
        K::P => Key::P,
        K::Q => Key::Q,
        K::R => Key::R,
        K::S => Key::S,
        K::T => Key::T,
        K::U => Key::U,
        K::V => Key::V,
        K::W => Key::W,
        K::X => Key::X,
        K::Y => Key::Y,
        K::Z => Key::Z,
        K::Up => Key::Up,
        K::Down => Key::Down,
        K::Left => Key::Left,
        K::Right => Key::Right,
        K::Space => Key::Space,
        K::Comma => Key::Comma,
        K::Period => Key::Period,
        K::Slash => Key::Slash,
        K::Backslash => Key::Backslash,
        K::Semicolon => Key::Semicolon,
        K::Apostrophe => Key::Apostrophe,
        K::Backquote => Key::Grave,
        K::Minus => Key::Minus,
        K::Equal => Key::Equals,
        K::LeftBracket => Key::LeftBracket,
        K::RightBracket => Key::RightBracket,
        K::Escape => Key::Escape,
        K::Home => Key::Home,
        K::End => Key::End,
        K::Delete => Key::Delete,
        K::PageUp => Key::PageUp,
        K::PageDown => Key::PageDown,
        K::F1 => Key::F1,
        K::F2 => Key::F2,
        K::F3 => Key::F3,
        K::F4 => Key::F4,
        K::F5 => Key::F5,
        K::F6 => Key::F6,
        K::F7 => Key::F7,
        K::F8 => Key::F8,
        K::F9 => Key::F9,
        K::F10 => Key::F10,
        K::F11 => Key::F11,
        K::F12 => Key::F12,
        K::LeftShift => Key::LeftShift,
        K::RightShift => Key::RightShift,
        K::LeftCtrl => Key::LeftControl,
        K::RightCtrl => Key::RightControl,
        K::LeftAlt => Key::LeftAlt,
        K::RightAlt => Key::RightAlt,
        K::Enter => Key::Return,
        K::Backspace => Key::Backspace,
        K::Tab => Key::Tab,
        K::CapsLock => Key::CapsLock,
        _ => return None,
    };
    Some(mapped)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("kvm_core", log::LevelFilter::Info)
        .filter_module("kvm_desktop", log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let config = KvmConfig {
        asset_dir: args.assets.clone(),
        ..Default::default()
    };
    let mut kvm = Kvm::new(config).context("failed to initialise VM")?;
    kvm.load_rom_file(&args.rom, RomRegion::Instruction)
        .with_context(|| format!("failed to load {}", args.rom.display()))?;

    let mut host = WindowHost::new(args.scale.clamp(1, 4))?;
    info!("running {}; close the window to exit", args.rom.display());

    while host.window.is_open() {
        host.presented = false;
        if !kvm.is_halted() {
            match kvm.step(&mut host, args.cycles_per_frame) {
                Ok(StepOutcome::Halted) => info!("ROM halted: {:?}", kvm.halt_reason()),
                Ok(StepOutcome::StillRunning) => {}
                Err(e) => error!("{}", e),
            }
            if kvm.take_break() {
                info!("break at {}", kvm.cpu());
            }
        }
        // Keep the window responsive when the ROM did not present
        if !host.presented {
            host.redraw();
        }
    }

    info!("window closed");
    Ok(())
}
