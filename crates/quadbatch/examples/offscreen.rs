//! Offscreen rendering — draw a rotating fan of sprites with wgpu and save
//! the result as `offscreen.png`.
//!
//! Needs a GPU adapter but no window.

use quadbatch::prelude::*;

const WIDTH: u32 = 512;
const HEIGHT: u32 = 512;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let gpu = GpuContext::headless()?;
    let mut device = WgpuDevice::<SpriteVertex>::new(gpu);
    device.set_target(WIDTH, HEIGHT);
    device.clear(Color::rgb(0.1, 0.1, 0.15));

    let defaults = DefaultResources::new(&mut device)?;
    let gradient = image::RgbaImage::from_fn(64, 64, |x, y| {
        image::Rgba([(x * 4) as u8, (y * 4) as u8, 200, 255])
    });
    let texture = device.create_texture(&TextureDesc::rgba("gradient", 64, 64, gradient.as_raw()))?;

    let device = share(device);
    let mut batch = SpriteBatch::new(device.clone(), defaults, BatchConfig::default(), (WIDTH, HEIGHT))?;

    batch.begin(BeginParams::new(SortPolicy::BackToFront).blend(BlendMode::AlphaBlend))?;
    let center = Vec2::new(WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0);
    for i in 0..24 {
        let angle = i as f32 * std::f32::consts::TAU / 24.0;
        let params = DrawParams::new(Destination::Position { position: center, scale: Vec2::new(3.0, 0.5) })
            .origin(Vec2::new(0.0, 32.0))
            .rotation(angle)
            .opacity(0.8)
            .depth(i as f32 / 24.0);
        batch.draw_ex(texture, &params)?;
    }
    batch.draw_line(center - Vec2::new(200.0, 0.0), center + Vec2::new(200.0, 0.0), Color::WHITE, 2.0, 0.0)?;
    let stats = batch.end()?;
    println!("{} sprites in {} draw calls", stats.sprites, stats.draw_calls);

    let pixels = device.lock().read_target()?;
    image::save_buffer("offscreen.png", &pixels, WIDTH, HEIGHT, image::ColorType::Rgba8)?;
    println!("wrote offscreen.png");
    Ok(())
}
