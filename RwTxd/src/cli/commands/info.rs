//! CLI command for showing dictionary contents

use std::path::Path;

use serde::Serialize;

use super::read_dictionary;
use crate::engine::Engine;
use crate::txd::Texture;

#[derive(Serialize)]
struct TextureInfo {
    name: String,
    mask_name: String,
    platform: Option<&'static str>,
    width: u32,
    height: u32,
    format: String,
    mipmaps: usize,
    filter: String,
    addressing: [String; 2],
}

#[derive(Serialize)]
struct DictionaryInfo {
    version: String,
    recommended_platform: u16,
    textures: Vec<TextureInfo>,
}

fn describe(texture: &Texture) -> TextureInfo {
    let raster = texture.raster();
    let (width, height) = raster.and_then(|r| r.size().ok()).unwrap_or((0, 0));
    TextureInfo {
        name: texture.name().to_string(),
        mask_name: texture.mask_name().to_string(),
        platform: raster.and_then(crate::raster::Raster::native_type_name),
        width,
        height,
        format: raster
            .and_then(|r| r.layout().ok())
            .map_or_else(|| "-".to_string(), |layout| layout.to_string()),
        mipmaps: raster.and_then(|r| r.mipmap_count().ok()).unwrap_or(0),
        filter: texture.filter().to_string(),
        addressing: [texture.u_addressing().to_string(), texture.v_addressing().to_string()],
    }
}

pub fn execute(source: &Path, json: bool) -> anyhow::Result<()> {
    let engine = Engine::new();
    let txd = read_dictionary(&engine, source)?;
    let info = DictionaryInfo {
        version: txd.version().to_string(),
        recommended_platform: txd.get_recommended_driver_platform(&engine),
        textures: txd.textures().map(describe).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{} (version {})", source.display(), info.version);
    println!(
        "{:<24}  {:<14}  {:>9}  {:<24}  {:>4}  {:<14}  ADDRESSING",
        "NAME", "PLATFORM", "SIZE", "FORMAT", "MIPS", "FILTER"
    );
    for texture in &info.textures {
        println!(
            "{:<24}  {:<14}  {:>9}  {:<24}  {:>4}  {:<14}  {}/{}",
            texture.name,
            texture.platform.unwrap_or("-"),
            format!("{}x{}", texture.width, texture.height),
            texture.format,
            texture.mipmaps,
            texture.filter,
            texture.addressing[0],
            texture.addressing[1]
        );
    }
    println!();
    println!("{} textures", info.textures.len());
    Ok(())
}
