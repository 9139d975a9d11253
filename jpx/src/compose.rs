use jp2::{
    BitDepth, ContiguousCodestreamBox, FileTypeBox, HeaderSuperBox, ImageHeaderBox, JP2File,
    BRAND_JP2, BRAND_JPX,
};
use jpc::insert_comment;
use log::debug;

use crate::colour::resolve_write;
use crate::error::JpxError;
use crate::image::Image;
use crate::metadata::{self, essentials_comment};

/// Builds every box of the output file except the codestream.
pub fn compose(image: &Image) -> Result<JP2File, JpxError> {
    let colour = resolve_write(image)?;

    let file_type = if colour.jpx {
        FileTypeBox::new(BRAND_JPX, vec![BRAND_JPX, BRAND_JP2])
    } else {
        FileTypeBox::new(BRAND_JP2, vec![BRAND_JP2])
    };

    let mut header = HeaderSuperBox::new(ImageHeaderBox::new(
        image.height,
        image.width,
        image.components,
        Some(BitDepth::Unsigned { value: image.bits }),
    ));
    header.colour_specification_boxes.push(colour.colour);
    header.channel_definition_box = Some(colour.channels);

    let mut file = JP2File::new(file_type, header);
    metadata::embed(&mut file, image);
    debug!(
        "Composed {} file with {} metadata boxes",
        file.file_type_box().brand(),
        file.uuid_boxes().len()
    );
    Ok(file)
}

/// Places the essentials record in the main header and appends the
/// codestream box to the file.
pub fn attach_codestream(
    file: &mut JP2File,
    codestream: Vec<u8>,
    essentials: Option<&str>,
) -> Result<(), JpxError> {
    let codestream = match essentials {
        Some(record) => insert_comment(&codestream, &essentials_comment(record))?,
        None => codestream,
    };
    file.push_contiguous_codestream_box(ContiguousCodestreamBox::new(codestream));
    Ok(())
}
