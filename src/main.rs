#[cfg(feature = "gui")]
use std::path::PathBuf;
#[cfg(feature = "gui")]
use std::time::Instant;

#[cfg(feature = "gui")]
use clap::Parser;
#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use beatgrid::{
    load_config, sequencer::persistence::validated_token, CellState, CpalBackend, FileStore,
    FragmentStore, Sequencer,
};

#[cfg(feature = "gui")]
#[derive(Debug, Parser)]
#[command(name = "beatgrid", about = "Shareable drum step sequencer")]
struct Args {
    /// TOML config file (defaults to ./beatgrid.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// File holding the current pattern token
    #[arg(long, default_value = "beatgrid.pattern")]
    state_file: PathBuf,

    /// Start from this token, e.g. the fragment of a shared link
    #[arg(long)]
    pattern: Option<String>,
}

#[cfg(feature = "gui")]
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let mut store = FileStore::new(&args.state_file);
    if let Some(pattern) = &args.pattern {
        match validated_token(pattern, config.cell_count()) {
            Ok(token) => store.write(token)?,
            Err(e) => tracing::warn!("ignoring --pattern: {}", e),
        }
    }

    let mut sequencer = Sequencer::new(&config, Box::new(store), Box::new(CpalBackend::new()))?;
    sequencer.start(Instant::now());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 360.0])
            .with_title("beatgrid"),
        ..Default::default()
    };

    eframe::run_native(
        "beatgrid",
        options,
        Box::new(|_cc| Ok(Box::new(SequencerApp { sequencer }))),
    )
    .map_err(|e| anyhow::anyhow!("GUI failed: {e}"))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct SequencerApp {
    sequencer: Sequencer,
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.sequencer.poll_external();
        self.sequencer.frame(Instant::now());

        let columns = self.sequencer.grid().columns();
        let view = self.sequencer.view();
        let mut picked = None;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("beatgrid");
            ui.add_space(10.0);

            egui::Grid::new("steps")
                .spacing(egui::vec2(6.0, 6.0))
                .show(ui, |ui| {
                    for cell in &view {
                        let fill = match cell.state {
                            CellState::Scanned => egui::Color32::from_rgb(0xbb, 0xff, 0xbb),
                            CellState::Active => egui::Color32::from_rgb(0x88, 0xee, 0x88),
                            CellState::Inactive => egui::Color32::from_rgb(0xff, 0xff, 0xff),
                        };
                        let button = egui::Button::new("")
                            .min_size(egui::vec2(40.0, 40.0))
                            .fill(fill);

                        if ui.add(button).clicked() {
                            picked = Some((cell.row, cell.column));
                        }
                        if cell.column + 1 == columns {
                            ui.end_row();
                        }
                    }
                });

            ui.add_space(10.0);
            ui.separator();
            ui.horizontal(|ui| {
                ui.label("Share:");
                ui.monospace(self.sequencer.share_fragment());
            });
            ui.label("Click steps to enable/disable them");
        });

        if let Some((row, column)) = picked {
            if let Err(e) = self.sequencer.pick(row, column) {
                tracing::warn!("pick ignored: {}", e);
            }
        }
    }
}
