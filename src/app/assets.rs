//! Asset decoding boundary. Everything past this module works on decoded
//! RGBA8 pixels and vertex/index arrays; no other code sniffs file formats.

use super::mesh::Vertex;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Result};
use nalgebra_glm as glm;

/// Decoded image pixels, always 4-channel 8-bit.
#[derive(Clone, Debug)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

pub fn load_png<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    decode_png(File::open(path)?)
}

/// Decodes a PNG stream. Only 8-bit RGBA images are accepted; anything else
/// is the asset pipeline's problem, not ours.
pub fn decode_png<R: Read>(reader: R) -> Result<RgbaImage> {
    let decoder = png::Decoder::new(reader);
    let mut reader = decoder.read_info()?;

    let mut data = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut data)?;

    if info.color_type != png::ColorType::Rgba || info.bit_depth != png::BitDepth::Eight {
        return Err(anyhow!(
            "Expected an 8-bit RGBA image, got {:?}/{:?}.",
            info.color_type,
            info.bit_depth
        ));
    }

    data.truncate(info.buffer_size());

    Ok(RgbaImage {
        width: info.width,
        height: info.height,
        data,
    })
}

pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<(Vec<Vertex>, Vec<u32>)> {
    decode_obj(&mut BufReader::new(File::open(path)?))
}

/// Loads a triangulated OBJ mesh. Positions are projected onto the XY plane
/// to match the pipeline's 2D position attribute, colors default to white,
/// and the texture V coordinate is flipped into Vulkan's convention.
pub fn decode_obj<R: std::io::BufRead>(reader: &mut R) -> Result<(Vec<Vertex>, Vec<u32>)> {
    let (models, _) = tobj::load_obj_buf(
        reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Ok(Default::default()),
    )?;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    // With `single_index` the loader has already rewritten the attribute
    // arrays so one index addresses all of them; vertices shared between
    // faces stay shared in the index buffer.
    for model in &models {
        let mesh = &model.mesh;
        let base = vertices.len() as u32;

        for i in 0..mesh.positions.len() / 3 {
            let pos = glm::vec2(mesh.positions[3 * i], mesh.positions[3 * i + 1]);
            let uv = if mesh.texcoords.is_empty() {
                glm::vec2(0.0, 0.0)
            } else {
                glm::vec2(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
            };
            vertices.push(Vertex::new(pos, glm::vec3(1.0, 1.0, 1.0), uv));
        }

        indices.extend(mesh.indices.iter().map(|i| base + i));
    }

    if indices.is_empty() {
        return Err(anyhow!("OBJ file contains no geometry."));
    }

    Ok((vertices, indices))
}

/// 2x2 magenta/black fallback texture for when no image asset is present.
pub fn checkerboard() -> RgbaImage {
    RgbaImage {
        width: 2,
        height: 2,
        data: vec![
            255, 0, 255, 255, //
            0, 0, 0, 255, //
            0, 0, 0, 255, //
            255, 0, 255, 255, //
        ],
    }
}

/// Unit quad fallback mesh, textured corner to corner.
pub fn quad() -> (Vec<Vertex>, Vec<u32>) {
    let white = glm::vec3(1.0, 1.0, 1.0);
    let vertices = vec![
        Vertex::new(glm::vec2(-0.5, -0.5), white, glm::vec2(0.0, 0.0)),
        Vertex::new(glm::vec2(0.5, -0.5), white, glm::vec2(1.0, 0.0)),
        Vertex::new(glm::vec2(0.5, 0.5), white, glm::vec2(1.0, 1.0)),
        Vertex::new(glm::vec2(-0.5, 0.5), white, glm::vec2(0.0, 1.0)),
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];
    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut encoder = png::Encoder::new(&mut buffer, width, height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
        writer.finish().unwrap();
        buffer
    }

    #[test]
    fn decodes_a_2x2_rgba_png() {
        let pixels = checkerboard();
        let encoded = encode_png(2, 2, png::ColorType::Rgba, &pixels.data);

        let decoded = decode_png(Cursor::new(encoded)).unwrap();
        assert_eq!(decoded.width, 2);
        assert_eq!(decoded.height, 2);
        assert_eq!(decoded.data, pixels.data);
    }

    #[test]
    fn rejects_non_rgba_pngs() {
        let encoded = encode_png(2, 2, png::ColorType::Grayscale, &[0, 64, 128, 255]);
        assert!(decode_png(Cursor::new(encoded)).is_err());
    }

    #[test]
    fn decodes_a_triangle_obj() {
        let obj = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
f 1/1 2/2 3/3
";
        let (vertices, indices) = decode_obj(&mut Cursor::new(obj)).unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(vertices[1].pos, glm::vec2(1.0, 0.0));
        // V is flipped.
        assert_eq!(vertices[0].uv, glm::vec2(0.0, 1.0));
        assert_eq!(vertices[2].uv, glm::vec2(0.0, 0.0));
        assert_eq!(vertices[0].color, glm::vec3(1.0, 1.0, 1.0));
    }

    #[test]
    fn shared_vertices_are_not_duplicated() {
        let obj = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 1/1 3/3 4/4
";
        let (vertices, indices) = decode_obj(&mut Cursor::new(obj)).unwrap();
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices.len(), 6);
        // The edge shared by both triangles reuses the same indices.
        assert_eq!(indices[0], indices[3]);
        assert_eq!(indices[2], indices[4]);
    }

    #[test]
    fn rejects_an_empty_obj() {
        assert!(decode_obj(&mut Cursor::new("")).is_err());
    }

    #[test]
    fn fallback_quad_is_two_triangles() {
        let (vertices, indices) = quad();
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices.len(), 6);
        assert!(indices.iter().all(|i| (*i as usize) < vertices.len()));
    }

    #[test]
    fn fallback_texture_is_2x2_rgba() {
        let image = checkerboard();
        assert_eq!(image.data.len(), (image.width * image.height * 4) as usize);
    }
}
