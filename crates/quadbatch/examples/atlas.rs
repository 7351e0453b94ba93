//! Atlas packing — pack generated tiles, then draw them in one batch.
//!
//! Runs on the recording device, so no GPU is needed. Prints where each tile
//! landed and how many draw calls the frame took.

use quadbatch::prelude::*;

fn checker(size: u32, a: [u8; 4], b: [u8; 4]) -> image::RgbaImage {
    image::RgbaImage::from_fn(size, size, |x, y| {
        image::Rgba(if (x / 4 + y / 4) % 2 == 0 { a } else { b })
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let mut device = RecordingDevice::<SpriteVertex>::new();
    let defaults = DefaultResources::new(&mut device)?;

    let packer = RectanglePacker::new(&AtlasConfig::default())?;
    let tiles = [
        ("grass", checker(32, [40, 160, 40, 255], [30, 120, 30, 255])),
        ("water", checker(32, [40, 80, 200, 255], [30, 60, 160, 255])),
        ("sand", checker(16, [220, 200, 120, 255], [200, 180, 100, 255])),
        ("stone", checker(48, [120, 120, 120, 255], [90, 90, 90, 255])),
    ];
    for (name, image) in &tiles {
        let rect = packer.add_texture(image, name)?;
        println!("{name:>6} -> {rect:?}");
    }
    let atlas = packer.create_texture(&mut device, "tiles")?;

    let device = share(device);
    let mut batch = SpriteBatch::new(device.clone(), defaults, BatchConfig::default(), (640, 480))?;

    batch.begin(BeginParams::new(SortPolicy::ByTexture))?;
    for row in 0..15 {
        for col in 0..20 {
            let name = tiles[(row + col) % tiles.len()].0;
            let Some(source) = packer.try_get_rectangle(name) else {
                continue;
            };
            let destination = Rect::new(col as f32 * 32.0, row as f32 * 32.0, 32.0, 32.0);
            batch.draw(atlas, destination, Some(source.into()), Color::WHITE)?;
        }
    }
    batch.fill_rectangle(Rect::new(0.0, 448.0, 640.0, 32.0), Color::rgba(0.0, 0.0, 0.0, 0.5), 0.0)?;
    let stats = batch.end()?;

    println!(
        "{} sprites in {} draw calls, atlas {:.1}% used",
        stats.sprites,
        stats.draw_calls,
        100.0 * packer.used_area() as f64 / (packer.width() as f64 * packer.height() as f64)
    );
    Ok(())
}
