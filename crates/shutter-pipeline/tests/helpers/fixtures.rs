use shutter_pipeline::SourceFile;

/// Distinct small "photo" payloads. They stay below the compression
/// threshold, so they are uploaded as-is.
pub fn photo(index: usize) -> SourceFile {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(format!("photo-{:04}", index).as_bytes());
    data.resize(2048, (index % 251) as u8);
    SourceFile::new(format!("photo-{}.jpg", index), data)
}

pub fn photos(count: usize) -> Vec<SourceFile> {
    (0..count).map(photo).collect()
}

/// Opaque RGB noise encoded as PNG. Re-encoding it as JPEG always shrinks it.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        let mut channel = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        image::Rgb([channel(), channel(), channel()])
    });

    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
