use crate::accumulate::PixelCountGrid;
use crate::error::{ExtractError, Result};
use crate::raster::{GeoKeys, GeoReference, GeoTransform, RasterGrid};
use log::{debug, info, warn};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32, Gray64Float};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKindStandard};
use tiff::tags::Tag;
use tiff::ColorType;

/// Source of raster grids, keyed by path.
///
/// Implementations must return missing cells as NaN.
pub trait RasterReader: Sync {
    fn read(&self, path: &Path) -> Result<RasterGrid>;
}

/// Pure-Rust single-band GeoTIFF reader
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffReader;

impl RasterReader for GeoTiffReader {
    fn read(&self, path: &Path) -> Result<RasterGrid> {
        debug!("Opening raster: {}", path.display());
        let file = File::open(path)?;
        decode_grid(BufReader::new(file))
    }
}

/// Decode the first image of a TIFF stream into a grid
pub fn decode_grid<R: Read + Seek>(reader: R) -> Result<RasterGrid> {
    let mut decoder = Decoder::new(reader)?;

    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(ExtractError::UnsupportedDataType(format!(
                "{:?} (expected single-band gray)",
                other
            )))
        }
    }

    let (width, height) = decoder.dimensions()?;
    let (cols, rows) = (width as usize, height as usize);
    if cols == 0 || rows == 0 {
        return Err(ExtractError::InvalidDimensions(cols, rows));
    }

    #[allow(unreachable_patterns)]
    let values: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(ExtractError::UnsupportedDataType(
                "unsupported TIFF sample format".to_string(),
            ))
        }
    };

    if values.len() != rows * cols {
        return Err(ExtractError::InvalidDimensions(cols, rows));
    }
    let data = Array2::from_shape_vec((rows, cols), values)?;

    let transform = match read_geotransform(&mut decoder) {
        Some(transform) => transform,
        None => {
            warn!("No ModelPixelScale/ModelTiepoint tags, using pixel coordinates");
            GeoTransform::default()
        }
    };
    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());
    let geo_keys = read_geo_keys(&mut decoder);

    debug!("Raster dimensions: {}x{}, nodata: {:?}", cols, rows, nodata);

    Ok(RasterGrid::from_raw(
        data,
        GeoReference {
            transform,
            projection: None,
            geo_keys,
        },
        nodata,
    ))
}

/// Geotransform from ModelPixelScale + ModelTiepoint, if both are present
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_geo_keys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoKeys> {
    let directory = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    let double_params = decoder
        .get_tag_f64_vec(Tag::GeoDoubleParamsTag)
        .unwrap_or_default();
    let ascii_params = decoder
        .get_tag_ascii_string(Tag::GeoAsciiParamsTag)
        .ok()
        .map(|s| s.trim_end_matches(char::from(0)).to_string());
    Some(GeoKeys {
        directory,
        double_params,
        ascii_params,
    })
}

/// Write a float grid as a single-band GeoTIFF, missing cells as NaN
pub fn write_grid<P: AsRef<Path>>(grid: &RasterGrid, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Writing raster: {}", path.display());
    encode_grid(grid, BufWriter::new(File::create(path)?))
}

/// Encode a float grid into any `Write + Seek` sink
pub fn encode_grid<W: Write + Seek>(grid: &RasterGrid, writer: W) -> Result<()> {
    let (rows, cols) = grid.shape();
    let data: Vec<f64> = grid.data().iter().copied().collect();

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray64Float>(cols as u32, rows as u32)?;
    write_geo_tags(image.encoder(), grid.georef(), Some("nan"))?;
    image.write_data(&data)?;
    Ok(())
}

/// Write occurrence counts as a 32-bit unsigned GeoTIFF
pub fn write_count_grid<P: AsRef<Path>>(counts: &PixelCountGrid, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Writing count raster: {}", path.display());
    encode_count_grid(counts, BufWriter::new(File::create(path)?))?;
    info!(
        "Wrote {}x{} count grid over {} images",
        counts.shape().1,
        counts.shape().0,
        counts.image_count()
    );
    Ok(())
}

pub fn encode_count_grid<W: Write + Seek>(counts: &PixelCountGrid, writer: W) -> Result<()> {
    let (rows, cols) = counts.shape();
    let data: Vec<u32> = counts.counts().iter().copied().collect();

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray32>(cols as u32, rows as u32)?;
    // Zero is a real count, so no nodata tag
    write_geo_tags(image.encoder(), counts.georef(), None)?;
    image.write_data(&data)?;
    Ok(())
}

fn write_geo_tags<W: Write + Seek>(
    dir: &mut DirectoryEncoder<'_, W, TiffKindStandard>,
    georef: &GeoReference,
    nodata: Option<&str>,
) -> Result<()> {
    let transform = &georef.transform;
    let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

    // Key directory is copied from the source only; without one the CRS stays unset
    match &georef.geo_keys {
        Some(keys) => {
            dir.write_tag(Tag::GeoKeyDirectoryTag, &keys.directory[..])?;
            if !keys.double_params.is_empty() {
                dir.write_tag(Tag::GeoDoubleParamsTag, &keys.double_params[..])?;
            }
            if let Some(ascii) = &keys.ascii_params {
                dir.write_tag(Tag::GeoAsciiParamsTag, ascii.as_str())?;
            }
        }
        None => {
            if georef.projection.is_some() {
                warn!("Projection WKT cannot be stored without GDAL; output has no CRS keys");
            }
        }
    }

    if let Some(nodata) = nodata {
        dir.write_tag(Tag::GdalNodata, nodata)?;
    }
    Ok(())
}
