use image::RgbaImage;

pub type PremulRgba8 = [u8; 4];

/// Source-over for one premultiplied pixel.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    let sa = src[3];
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        out[i] = add_sat_u8(src[i], mul_div255(u16::from(dst[i]), inv));
    }
    out
}

pub fn premultiply(px: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(px[3]);
    if a == 0 {
        return [0, 0, 0, 0];
    }
    [
        mul_div255(u16::from(px[0]), a),
        mul_div255(u16::from(px[1]), a),
        mul_div255(u16::from(px[2]), a),
        px[3],
    ]
}

pub fn unpremultiply(px: PremulRgba8) -> [u8; 4] {
    let a = u32::from(px[3]);
    match a {
        0 => [0, 0, 0, 0],
        255 => px,
        _ => {
            let un = |c: u8| ((u32::from(c) * 255 + a / 2) / a).min(255) as u8;
            [un(px[0]), un(px[1]), un(px[2]), px[3]]
        }
    }
}

/// Blend `overlay` onto `base` with its top-left corner at (`x`, `y`).
///
/// Both images hold straight RGBA8. Pixels falling outside `base` are
/// clipped, so any anchor is accepted.
pub fn overlay_at(base: &mut RgbaImage, overlay: &RgbaImage, x: i64, y: i64) {
    let (bw, bh) = (i64::from(base.width()), i64::from(base.height()));
    let (ow, oh) = (i64::from(overlay.width()), i64::from(overlay.height()));

    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = x.saturating_add(ow).min(bw);
    let y1 = y.saturating_add(oh).min(bh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for by in y0..y1 {
        for bx in x0..x1 {
            let src = overlay.get_pixel((bx - x) as u32, (by - y) as u32).0;
            if src[3] == 0 {
                continue;
            }
            let dst = base.get_pixel_mut(bx as u32, by as u32);
            let blended = over(premultiply(dst.0), premultiply(src));
            dst.0 = unpremultiply(blended);
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}
