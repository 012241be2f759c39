//! INDY-3 viewer - desktop debugger using egui

use std::path::{Path, PathBuf};
use std::time::Instant;

use eframe::egui;
use kvm_core::input::{InputSnapshot, Key, MouseState};
use kvm_core::{Frame, Host, Kvm, KvmConfig, RomRegion, StepOutcome};
use log::{error, info};

const CONSOLE_LINES: usize = 200;

/// Host that hands frames and input across the egui update loop
#[derive(Default)]
struct ViewerHost {
    frame: Option<Frame>,
    input: InputSnapshot,
    console: Vec<String>,
}

impl Host for ViewerHost {
    fn present(&mut self, frame: &Frame) {
        self.frame = Some(frame.clone());
    }

    fn sample_input(&mut self) -> InputSnapshot {
        self.input.clone()
    }

    fn print(&mut self, text: &str) {
        info!("rom: {}", text);
        if self.console.len() == CONSOLE_LINES {
            self.console.remove(0);
        }
        self.console.push(text.to_string());
    }
}

/// App state for the egui application
struct Indy3App {
    kvm: Kvm,
    host: ViewerHost,
    rom_path: Option<PathBuf>,
    running: bool,
    cycles_per_frame: i64,
    texture: Option<egui::TextureHandle>,
    screen_rect: Option<egui::Rect>,
    last_frame_time: Instant,
    fps: f64,
}

impl Indy3App {
    fn new() -> Result<Self, kvm_core::KvmError> {
        Ok(Self {
            kvm: Kvm::new(KvmConfig::default())?,
            host: ViewerHost::default(),
            rom_path: None,
            running: false,
            cycles_per_frame: 20_000,
            texture: None,
            screen_rect: None,
            last_frame_time: Instant::now(),
            fps: 0.0,
        })
    }

    fn load_rom(&mut self, path: &Path) {
        // Assets are looked up next to the ROM
        let config = KvmConfig {
            asset_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            ..Default::default()
        };
        let loaded = Kvm::new(config).and_then(|mut kvm| {
            kvm.load_rom_file(path, RomRegion::Instruction)?;
            Ok(kvm)
        });
        match loaded {
            Ok(kvm) => {
                info!("loaded {}", path.display());
                self.kvm = kvm;
                self.host = ViewerHost::default();
                self.rom_path = Some(path.to_path_buf());
                self.running = true;
            }
            Err(e) => error!("failed to load {}: {}", path.display(), e),
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context) {
        let screen = self.screen_rect;
        self.host.input = ctx.input(|i| {
            let mut keys_down: Vec<Key> = i.keys_down.iter().copied().filter_map(map_key).collect();
            // egui reports modifiers separately from keys
            if i.modifiers.shift {
                keys_down.push(Key::LeftShift);
            }
            if i.modifiers.ctrl {
                keys_down.push(Key::LeftControl);
            }
            if i.modifiers.alt {
                keys_down.push(Key::LeftAlt);
            }

            let (x, y) = match (i.pointer.hover_pos(), screen) {
                (Some(pos), Some(rect)) => MouseState::from_window(
                    pos.x - rect.min.x,
                    pos.y - rect.min.y,
                    rect.width(),
                    rect.height(),
                ),
                _ => (0, 0),
            };
            let mouse = MouseState::new(
                x,
                y,
                i.pointer.button_down(egui::PointerButton::Primary),
                i.pointer.button_down(egui::PointerButton::Middle),
                i.pointer.button_down(egui::PointerButton::Secondary),
            );
            InputSnapshot { keys_down, mouse }
        });
    }

    fn run_cycles(&mut self, cycles: i64) {
        if self.kvm.is_halted() {
            return;
        }
        match self.kvm.step(&mut self.host, cycles) {
            Ok(StepOutcome::Halted) => {
                info!("halted: {:?}", self.kvm.halt_reason());
                self.running = false;
            }
            Ok(StepOutcome::StillRunning) => {}
            Err(e) => {
                error!("{}", e);
                self.running = false;
            }
        }
        if self.kvm.take_break() {
            info!("break at {}", self.kvm.cpu());
            self.running = false;
        }
    }

    fn upload_frame(&mut self, ctx: &egui::Context) {
        let Some(frame) = self.host.frame.take() else {
            return;
        };
        let image = egui::ColorImage::from_rgba_unmultiplied(
            [frame.width(), frame.height()],
            &frame.to_rgba_bytes(),
        );
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::NEAREST),
            None => {
                let texture = ctx.load_texture("kvm_frame", image, egui::TextureOptions::NEAREST);
                self.texture = Some(texture);
            }
        }
    }

    fn cpu_panel(&self, ui: &mut egui::Ui) {
        let cpu = self.kvm.cpu();
        let regs = cpu.registers();
        ui.heading("CPU");
        ui.monospace(format!("PC  ${:04X}", regs.pc));
        ui.monospace(format!("A   ${:02X}", regs.a));
        ui.monospace(format!("X   ${:02X}", regs.x));
        ui.monospace(format!("Y   ${:02X}", regs.y));
        ui.monospace(format!("SP  ${:02X}", regs.sp));
        ui.monospace(format!("P   {}", cpu.status()));
        ui.monospace(format!("Op  {}", cpu.instruction()));
        ui.monospace(format!("Cycles {}", cpu.total_cycles()));
        if let Some(reason) = self.kvm.halt_reason() {
            ui.colored_label(egui::Color32::YELLOW, format!("Halted: {:?}", reason));
        }

        ui.separator();
        ui.heading("Console");
        egui::ScrollArea::vertical().stick_to_bottom(true).show(ui, |ui| {
            for line in &self.host.console {
                ui.monospace(line);
            }
        });
    }
}

/// Map an egui key onto the INDY-3 keyboard layout
fn map_key(key: egui::Key) -> Option<Key> {
    use egui::Key as K;
    let mapped = match key {
        K::Num0 => Key::Num0,
        K::Num1 => Key::Num1,
        K::Num2 => Key::Num2,
        K::Num3 => Key::Num3,
        K::Num4 => Key::Num4,
        K::Num5 => Key::Num5,
        K::Num6 => Key::Num6,
        K::Num7 => Key::Num7,
        K::Num8 => Key::Num8,
        K::Num9 => Key::Num9,
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
        K::ArrowUp => Key::Up,
        K::ArrowDown => Key::Down,
        K::ArrowLeft => Key::Left,
        K::ArrowRight => Key::Right,
        K::Space => Key::Space,
        K::Comma => Key::Comma,
        K::Period => Key::Period,
        K::Slash => Key::Slash,
        K::Backslash => Key::Backslash,
        K::Semicolon => Key::Semicolon,
        K::Backtick => Key::Grave,
        K::Minus => Key::Minus,
        K::Equals => Key::Equals,
        K::OpenBracket => Key::LeftBracket,
        K::CloseBracket => Key::RightBracket,
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
        K::Enter => Key::Return,
        K::Backspace => Key::Backspace,
        K::Tab => Key::Tab,
        _ => return None,
    };
    Some(mapped)
}

impl eframe::App for Indy3App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_input(ctx);

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f64();
        self.fps = 1.0 / dt.max(0.001);
        self.last_frame_time = now;

        if self.running {
            self.run_cycles(self.cycles_per_frame);
            ctx.request_repaint();
        }
        self.upload_frame(ctx);

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                if ui.button("Open ROM").clicked() {
                    if let Some(path) = rfd::FileDialog::new().pick_file() {
                        self.load_rom(&path);
                    }
                }
                let label = if self.running { "Pause" } else { "Run" };
                if ui.button(label).clicked() {
                    self.running = !self.running;
                }
                if ui.button("Step").clicked() {
                    self.running = false;
                    self.run_cycles(1);
                }
                if ui.button("Reset").clicked() {
                    self.kvm.reset();
                    self.host.console.clear();
                }
                ui.add(
                    egui::DragValue::new(&mut self.cycles_per_frame)
                        .range(1..=1_000_000)
                        .prefix("cycles/frame "),
                );
                ui.label(format!("FPS: {:.1}", self.fps));
            });
        });

        egui::SidePanel::right("cpu_panel").show(ctx, |ui| self.cpu_panel(ui));

        egui::CentralPanel::default().show(ctx, |ui| match &self.texture {
            Some(texture) => {
                let image = egui::Image::from_texture(texture)
                    .fit_to_exact_size(egui::Vec2::new(512.0, 512.0));
                self.screen_rect = Some(ui.add(image).rect);
            }
            None => {
                let hint = if self.rom_path.is_some() {
                    "Waiting for the ROM to present a frame."
                } else {
                    "No ROM loaded. Use Open ROM to pick one."
                };
                ui.label(hint);
            }
        });

        let title = match &self.rom_path {
            Some(path) => format!("INDY-3 - {}", path.display()),
            None => "INDY-3".to_string(),
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));
    }
}

fn main() -> eframe::Result {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("kvm_core", log::LevelFilter::Info)
        .filter_module("indy3", log::LevelFilter::Info)
        .init();

    let viewport = egui::ViewportBuilder::default().with_inner_size(egui::Vec2::new(800.0, 580.0));
    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    let mut app = match Indy3App::new() {
        Ok(app) => app,
        Err(e) => {
            error!("failed to initialise VM: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(path) = std::env::args().nth(1) {
        app.load_rom(Path::new(&path));
    }

    eframe::run_native("INDY-3", native_options, Box::new(move |_| Ok(Box::new(app))))
}
