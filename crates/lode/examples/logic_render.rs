//! Logic/render split over one shared arena.
//!
//! The logic thread streams chunks in and out around a moving player,
//! rewriting voxels under a region lock. The render thread receives chunk
//! handles over a channel and reads them without any lock of its own;
//! chunks unloaded in the meantime read as absent.
//!
//! ```text
//! cargo run -p lode --example logic_render
//! ```

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use crossbeam_channel::{bounded, Receiver, Sender};
use lode::prelude::*;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

const CHUNK_VOLUME: usize = 16 * 16 * 16;
const LOADED_CHUNKS: usize = 8;
const TICKS: u16 = 64;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
struct Voxel {
    block: u16,
    light: u16,
}

/// Compiled shader program; owned by the render thread for the whole run.
struct Shader {
    name: &'static str,
    uniforms: Vec<&'static str>,
}

fn logic(arena: SharedArena, frames: Sender<Handle<[Voxel]>>) -> Result<(), ArenaError> {
    let mut loaded: VecDeque<Handle<[Voxel]>> = VecDeque::new();
    for tick in 1..=TICKS {
        let chunk = arena.new_array::<Voxel>(CHUNK_VOLUME)?;
        if let Some(mut lock) = arena.lock_typed(chunk)? {
            let mut voxels = lock.get_mut()?;
            for (i, voxel) in voxels.iter_mut().enumerate() {
                // Ground up to a height that drifts with the tick.
                let y = i / (16 * 16);
                if y < 4 + usize::from(tick % 8) {
                    *voxel = Voxel { block: 1, light: 0 };
                }
            }
        }
        loaded.push_back(chunk);

        if loaded.len() > LOADED_CHUNKS {
            if let Some(old) = loaded.pop_front() {
                arena.delete(old)?;
            }
        }
        if frames.send(chunk).is_err() {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    for chunk in loaded {
        arena.delete(chunk)?;
    }
    Ok(())
}

fn render(arena: SharedArena, frames: Receiver<Handle<[Voxel]>>) -> Result<(usize, usize), ArenaError> {
    let shader = arena.new_unchecked(Shader {
        name: "terrain",
        uniforms: vec!["u_view", "u_proj", "u_sun"],
    })?;
    info!("render: using shader {} ({} uniforms)", shader.name, shader.uniforms.len());

    let mut drawn = 0;
    let mut skipped = 0;
    for chunk in frames {
        // Let the logic thread run ahead so some chunks unload first.
        thread::sleep(Duration::from_millis(5));
        match arena.get_typed(chunk)? {
            Some(voxels) => {
                let solid = voxels.iter().filter(|v| v.block != 0).count();
                log::debug!("render: chunk {} has {solid} solid voxels", chunk.addr());
                drawn += 1;
            }
            None => skipped += 1,
        }
    }
    arena.delete_unchecked(shader);
    Ok((drawn, skipped))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let config = ArenaConfig::new(8 * 1024 * 1024).with_validation(Validation::Lenient);
    let arena = Arena::new(config)?.into_shared();
    info!("arena ready: {}", arena.stats());

    let (tx, rx) = bounded(LOADED_CHUNKS * 4);
    let logic_thread = {
        let arena = arena.clone();
        thread::spawn(move || logic(arena, tx))
    };
    let render_thread = {
        let arena = arena.clone();
        thread::spawn(move || render(arena, rx))
    };

    logic_thread.join().map_err(|_| "logic thread panicked")??;
    let (drawn, skipped) = render_thread.join().map_err(|_| "render thread panicked")??;
    info!("render: drew {drawn} chunks, skipped {skipped} unloaded");

    match std::sync::Arc::try_unwrap(arena) {
        Ok(arena) => info!("arena destroyed: {}", arena.destroy()),
        Err(_) => log::warn!("arena still shared at exit"),
    }
    Ok(())
}
