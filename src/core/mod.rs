// ─── PLauncher Core ───
// Process lifecycle and background work for a single-instance game launcher.
//
// Architecture:
//   core/
//     instance/      — Instance model + derived paths
//     launch/        — Command resolution, process groups, supervisor
//     status/        — Status file store + periodic poller
//     downloader/    — Streamed asset downloads with progress
//     release/       — Release feed + platform asset selection
//     mods/          — Suffix-based mod enable/disable
//     game_settings/ — `key=value` game settings file
//     events/        — Event channel back to the caller
//     state/         — Launcher settings + owning facade

pub mod downloader;
pub mod error;
pub mod events;
pub mod game_settings;
pub mod http;
pub mod instance;
pub mod launch;
pub mod mods;
pub mod release;
pub mod state;
pub mod status;
