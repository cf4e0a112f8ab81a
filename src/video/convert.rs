// Pixel layout conversion at a fixed resolution.
//
// YUV sources use BT.601 with fixed-point integer arithmetic (<<8), the same
// coefficients as the capture path. Destinations are always packed RGB.

use super::frame::PixelFormat;

/// BT.601 YUV to RGB for one sample. `u` and `v` are already centred on 0.
#[inline]
fn yuv_to_rgb(y: i32, u: i32, v: i32) -> [u8; 3] {
    [
        ((y * 256 + 359 * v) >> 8).clamp(0, 255) as u8,
        ((y * 256 - 88 * u - 183 * v) >> 8).clamp(0, 255) as u8,
        ((y * 256 + 454 * u) >> 8).clamp(0, 255) as u8,
    ]
}

/// Read pixel `(col, row)` from a tightly packed source as RGBA.
#[inline]
fn sample(
    src: &[u8],
    format: PixelFormat,
    width: usize,
    height: usize,
    col: usize,
    row: usize,
) -> [u8; 4] {
    match format {
        PixelFormat::Rgb24 => {
            let i = (row * width + col) * 3;
            [src[i], src[i + 1], src[i + 2], 255]
        }
        PixelFormat::Bgr24 => {
            let i = (row * width + col) * 3;
            [src[i + 2], src[i + 1], src[i], 255]
        }
        PixelFormat::Rgba => {
            let i = (row * width + col) * 4;
            [src[i], src[i + 1], src[i + 2], src[i + 3]]
        }
        PixelFormat::Bgra => {
            let i = (row * width + col) * 4;
            [src[i + 2], src[i + 1], src[i], src[i + 3]]
        }
        PixelFormat::Yuyv422 => {
            // Two pixels per 4-byte macro-pixel: [Y0, U, Y1, V].
            let stride = width.div_ceil(2) * 4;
            let base = row * stride + (col / 2) * 4;
            let y = src[base + (col % 2) * 2] as i32;
            let u = src[base + 1] as i32 - 128;
            let v = src[base + 3] as i32 - 128;
            let [r, g, b] = yuv_to_rgb(y, u, v);
            [r, g, b, 255]
        }
        PixelFormat::Nv12 => {
            // Each 2x2 block of luma samples shares one U,V pair.
            let chroma_stride = width.div_ceil(2) * 2;
            let y = src[row * width + col] as i32;
            let uv = width * height + (row / 2) * chroma_stride + (col / 2) * 2;
            let u = src[uv] as i32 - 128;
            let v = src[uv + 1] as i32 - 128;
            let [r, g, b] = yuv_to_rgb(y, u, v);
            [r, g, b, 255]
        }
    }
}

#[inline]
fn store(px: [u8; 4], format: PixelFormat, out: &mut [u8]) {
    let [r, g, b, a] = px;
    match format {
        PixelFormat::Rgb24 => out.copy_from_slice(&[r, g, b]),
        PixelFormat::Bgr24 => out.copy_from_slice(&[b, g, r]),
        PixelFormat::Rgba => out.copy_from_slice(&[r, g, b, a]),
        PixelFormat::Bgra => out.copy_from_slice(&[b, g, r, a]),
        PixelFormat::Yuyv422 | PixelFormat::Nv12 => {
            unreachable!("YUV destinations are rejected before conversion")
        }
    }
}

/// Convert a `width` x `height` frame from `src_format` into `dst_format`.
///
/// Callers guarantee that `src` and `dst` hold at least a full frame of their
/// format and that `dst_format` is packed RGB.
pub fn convert_into(
    src: &[u8],
    src_format: PixelFormat,
    width: u32,
    height: u32,
    dst: &mut [u8],
    dst_format: PixelFormat,
) {
    let (w, h) = (width as usize, height as usize);
    let dst_len = dst_format.frame_size(width, height);

    if src_format == dst_format {
        dst[..dst_len].copy_from_slice(&src[..dst_len]);
        return;
    }

    let Some(bpp) = dst_format.bytes_per_pixel() else {
        return;
    };
    for (i, out) in dst[..dst_len].chunks_exact_mut(bpp).enumerate() {
        let (row, col) = (i / w, i % w);
        store(sample(src, src_format, w, h, col, row), dst_format, out);
    }
}
