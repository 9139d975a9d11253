use std::io::{Cursor, Seek as _, SeekFrom};

use jp2::{
    decode_jp2, encode_box_header, encode_jp2, BitDepth, BitsPerComponentBox, Channel,
    ChannelDefinitionBox, ChannelTypes, ColourSpecificationBox, ColourSpecificationMethods,
    ComponentMap, ComponentMapType, ComponentMappingBox, ContiguousCodestreamBox,
    DataEntryURLBox, EnumeratedColourSpaces, FileTypeBox, GeneratedComponent, HeaderSuperBox,
    ImageHeaderBox, JBox as _, JP2Error, JP2File, PaletteBox, ResolutionBox, ResolutionSuperBox,
    UUIDBox, UUIDInfoSuperBox, UUIDListBox, XMLBox, BOX_TYPE_CAPTURE_RESOLUTION,
    BOX_TYPE_CONTIGUOUS_CODESTREAM, BOX_TYPE_HEADER, BRAND_JP2, BRAND_JPX,
    CHANNEL_ASSOCIATION_WHOLE_IMAGE,
};
use jpc::{
    CodingStyleMarkerSegment, ComponentSize, ImageAndTileSizeMarkerSegment, ProgressionOrder,
    TransformationFilter, MARKER_SYMBOL_EOC, MARKER_SYMBOL_SOC, MARKER_SYMBOL_SOT,
};

const XMP_UUID: [u8; 16] = [
    0xBE, 0x7A, 0xCF, 0xCB, 0x97, 0xA9, 0x42, 0xE8, 0x9C, 0x71, 0x99, 0x94, 0x91, 0xE3, 0xAF, 0xAC,
];

fn codestream(width: u32, height: u32, components: u16) -> Vec<u8> {
    let mut data = MARKER_SYMBOL_SOC.to_vec();
    let sizes = vec![ComponentSize::new(8, false); components as usize];
    ImageAndTileSizeMarkerSegment::new(width, height, &sizes)
        .encode(&mut data)
        .unwrap();
    CodingStyleMarkerSegment::new(
        ProgressionOrder::RLPCLP,
        1,
        components >= 3,
        5,
        (6, 6),
        TransformationFilter::Reversible,
        &[],
        false,
    )
    .encode(&mut data)
    .unwrap();
    data.extend_from_slice(&MARKER_SYMBOL_SOT);
    data.extend_from_slice(&[0, 10, 0, 0, 0, 0, 0, 14, 0, 1]);
    data.extend_from_slice(&[255, 147]);
    data.extend_from_slice(&MARKER_SYMBOL_EOC);
    data
}

fn srgb_file(codestream: Vec<u8>) -> JP2File {
    let mut header = HeaderSuperBox::new(ImageHeaderBox::new(
        128,
        64,
        3,
        Some(BitDepth::Unsigned { value: 8 }),
    ));
    header
        .colour_specification_boxes
        .push(ColourSpecificationBox::new_enumerated(
            EnumeratedColourSpaces::sRGB,
        ));
    let mut file = JP2File::new(FileTypeBox::new(BRAND_JP2, vec![BRAND_JP2]), header);
    file.push_contiguous_codestream_box(ContiguousCodestreamBox::new(codestream));
    file
}

fn encode(file: &JP2File) -> Vec<u8> {
    let mut data = Vec::new();
    encode_jp2(&mut data, file).unwrap();
    data
}

#[test]
fn test_srgb() {
    let stream = codestream(64, 128, 3);
    let data = encode(&srgb_file(stream.clone()));
    let mut reader = Cursor::new(&data);
    let result = decode_jp2(&mut reader);
    assert!(result.is_ok());
    let boxes = result.unwrap();
    assert_eq!(boxes.length(), data.len() as u64);

    assert_eq!(boxes.signature_box().signature(), *b"\x0d\x0a\x87\x0a");

    let file_type = boxes.file_type_box();
    assert_eq!(file_type.brand(), "jp2 ");
    assert!(!file_type.is_jpx());
    assert_eq!(file_type.min_version(), 0);
    assert_eq!(file_type.compatibility_list(), vec!["jp2 "]);

    assert!(boxes.header_box().is_some());
    let header_box = boxes.header_box().as_ref().unwrap();
    let image_header_box = &header_box.image_header_box;
    assert_eq!(image_header_box.height(), 128);
    assert_eq!(image_header_box.width(), 64);
    assert_eq!(image_header_box.components_num(), 3);
    assert_eq!(image_header_box.compression_type(), 7);
    assert_eq!(image_header_box.colourspace_unknown(), 0);
    assert_eq!(image_header_box.intellectual_property(), 0);
    assert_eq!(
        image_header_box.bit_depth(),
        Some(BitDepth::Unsigned { value: 8 })
    );

    assert!(header_box.bits_per_component_box.is_none());

    assert_eq!(header_box.colour_specification_boxes.len(), 1);
    let colour_specification_box = header_box.colour_specification_boxes.first().unwrap();
    assert_eq!(
        colour_specification_box.method(),
        ColourSpecificationMethods::EnumeratedColourSpace
    );
    assert_eq!(colour_specification_box.precedence(), 0);
    assert_eq!(colour_specification_box.colourspace_approximation(), 0u8);
    assert_eq!(
        colour_specification_box.enumerated_colour_space(),
        Some(EnumeratedColourSpaces::sRGB)
    );
    assert!(colour_specification_box.icc_profile().is_none());

    assert!(header_box.palette_box.is_none());
    assert!(header_box.component_mapping_box.is_none());
    assert!(header_box.channel_definition_box.is_none());
    assert!(header_box.resolution_box.is_none());

    // signature (12) + file type (20) + header (8 + 22 + 15) + codestream header (8)
    assert_eq!(boxes.contiguous_codestreams_boxes().len(), 1);
    let codestream_box = boxes.contiguous_codestreams_boxes().first().unwrap();
    assert_eq!(codestream_box.offset(), 85);
    assert_eq!(codestream_box.length(), stream.len() as u64);

    assert!(reader
        .seek(SeekFrom::Start(codestream_box.offset()))
        .is_ok());
    let codestream = jpc::decode_jpc(&mut reader).unwrap();
    let siz = codestream.header().image_and_tile_size_marker_segment();
    assert_eq!(siz.width(), 64);
    assert_eq!(siz.height(), 128);
    assert_eq!(siz.offset(), 89);

    assert!(boxes.xml_boxes().is_empty());
    assert!(boxes.uuid_boxes().is_empty());
    assert!(boxes.uuid_info_boxes().is_empty());
    assert!(boxes.intellectual_property_box().is_none());
}

#[test]
fn test_metadata_boxes() {
    let mut file = srgb_file(codestream(64, 128, 3));
    file.push_xml_box(XMLBox::new(b"<x/>".to_vec()));
    file.push_uuid_box(UUIDBox::new(XMP_UUID, b"<x:xmpmeta/>".to_vec()));
    file.push_uuid_info_box(UUIDInfoSuperBox::new(
        UUIDListBox::new(vec![XMP_UUID]),
        DataEntryURLBox::new("http://example.com/xmp"),
    ));
    let data = encode(&file);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    assert_eq!(boxes.xml_boxes().len(), 1);
    assert_eq!(boxes.xml_boxes()[0].format(), "<x/>");

    assert_eq!(boxes.uuid_boxes().len(), 1);
    let uuid_box = &boxes.uuid_boxes()[0];
    assert_eq!(uuid_box.uuid(), &XMP_UUID);
    assert_eq!(uuid_box.data(), &b"<x:xmpmeta/>".to_vec());
    assert_eq!(uuid_box.length(), 16 + 12);

    assert_eq!(boxes.uuid_info_boxes().len(), 1);
    let uuid_info = &boxes.uuid_info_boxes()[0];
    let list = uuid_info.uuid_list().as_ref().unwrap();
    assert_eq!(list.ids(), &vec![XMP_UUID]);
    let url = uuid_info.data_entry_url().as_ref().unwrap();
    assert_eq!(url.location().unwrap(), "http://example.com/xmp");
}

#[test]
fn test_palette_and_channels() {
    let mut header = HeaderSuperBox::new(ImageHeaderBox::new(
        16,
        16,
        1,
        Some(BitDepth::Unsigned { value: 8 }),
    ));
    header
        .colour_specification_boxes
        .push(ColourSpecificationBox::new_enumerated(
            EnumeratedColourSpaces::sRGB,
        ));
    header.palette_box = Some(PaletteBox::new(vec![
        GeneratedComponent::new(BitDepth::Unsigned { value: 8 }, vec![0, 255]),
        GeneratedComponent::new(BitDepth::Unsigned { value: 12 }, vec![4095, 0]),
        GeneratedComponent::new(BitDepth::Signed { value: 8 }, vec![128, 127]),
    ]));
    header.component_mapping_box = Some(ComponentMappingBox::new(
        (0..3)
            .map(|column| ComponentMap::new(0, ComponentMapType::Palette, column))
            .collect(),
    ));
    header.channel_definition_box = Some(ChannelDefinitionBox::new(vec![
        Channel::new(0, ChannelTypes::ColourImageData, 1),
        Channel::new(1, ChannelTypes::ColourImageData, 2),
        Channel::new(2, ChannelTypes::ColourImageData, 3),
    ]));
    let mut file = JP2File::new(FileTypeBox::new(BRAND_JP2, vec![BRAND_JP2]), header);
    file.push_contiguous_codestream_box(ContiguousCodestreamBox::new(codestream(16, 16, 1)));
    let data = encode(&file);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    let header_box = boxes.header_box().as_ref().unwrap();

    let palette = header_box.palette_box.as_ref().unwrap();
    assert_eq!(palette.num_entries(), 2);
    assert_eq!(palette.num_components(), 3);
    // 3 + 3 bit depths + 2 entries of 1 + 2 + 1 bytes
    assert_eq!(palette.length(), 3 + 3 + 2 * 4);
    let columns = palette.generated_components();
    assert_eq!(columns[0].values(), &vec![0, 255]);
    assert_eq!(columns[1].bit_depth(), BitDepth::Unsigned { value: 12 });
    assert_eq!(columns[1].values(), &vec![4095, 0]);
    assert!(columns[2].bit_depth().is_signed());
    assert_eq!(columns[2].values(), &vec![128, 127]);

    let mapping = header_box.component_mapping_box.as_ref().unwrap();
    assert_eq!(mapping.component_map().len(), 3);
    assert_eq!(mapping.component_map()[2].component(), 0);
    assert_eq!(
        mapping.component_map()[2].mapping_type(),
        ComponentMapType::Palette
    );
    assert_eq!(mapping.component_map()[2].palette(), 2);

    let channels = header_box
        .channel_definition_box
        .as_ref()
        .unwrap()
        .channels();
    assert_eq!(channels.len(), 3);
    assert_eq!(channels[1].channel_index(), 1);
    assert_eq!(channels[1].channel_type(), ChannelTypes::ColourImageData);
    assert_eq!(channels[1].channel_association(), 2);
}

#[test]
fn test_icc_and_alpha() {
    let mut header = HeaderSuperBox::new(ImageHeaderBox::new(8, 8, 4, None));
    let depths = [
        BitDepth::Unsigned { value: 16 },
        BitDepth::Unsigned { value: 16 },
        BitDepth::Unsigned { value: 16 },
        BitDepth::Unsigned { value: 8 },
    ];
    header.bits_per_component_box = Some(BitsPerComponentBox::new(&depths));
    header
        .colour_specification_boxes
        .push(ColourSpecificationBox::new_icc_profile(
            ColourSpecificationMethods::AnyICCProfile,
            vec![1, 2, 3, 4, 5],
        ));
    header.channel_definition_box = Some(ChannelDefinitionBox::new(vec![Channel::new(
        3,
        ChannelTypes::PremultipliedOpacity,
        CHANNEL_ASSOCIATION_WHOLE_IMAGE,
    )]));
    header.resolution_box = Some(ResolutionSuperBox::new(
        Some(ResolutionBox::new(
            BOX_TYPE_CAPTURE_RESOLUTION,
            (3000, 1, 0),
            (30, 1, 2),
        )),
        None,
    ));
    let mut file = JP2File::new(
        FileTypeBox::new(BRAND_JPX, vec![BRAND_JPX, BRAND_JP2]),
        header,
    );
    file.push_contiguous_codestream_box(ContiguousCodestreamBox::new(codestream(8, 8, 4)));
    let data = encode(&file);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    assert!(boxes.file_type_box().is_jpx());
    let header_box = boxes.header_box().as_ref().unwrap();
    assert!(header_box.image_header_box.bit_depth().is_none());
    assert_eq!(
        header_box
            .bits_per_component_box
            .as_ref()
            .unwrap()
            .bits_per_component(),
        depths.to_vec()
    );

    let colour = &header_box.colour_specification_boxes[0];
    assert_eq!(colour.method(), ColourSpecificationMethods::AnyICCProfile);
    assert_eq!(colour.icc_profile(), Some(&[1u8, 2, 3, 4, 5][..]));
    assert!(colour.enumerated_colour_space().is_none());

    let channel = &header_box
        .channel_definition_box
        .as_ref()
        .unwrap()
        .channels()[0];
    // premultiplied opacity is type 2
    assert_eq!(channel.channel_type(), ChannelTypes::PremultipliedOpacity);
    assert_eq!(channel.channel_type().value(), 2);

    let resolution = header_box.resolution_box.as_ref().unwrap();
    let capture = resolution.capture_resolution_box().as_ref().unwrap();
    assert_eq!(capture.vertical_resolution(), 3000.0);
    assert_eq!(capture.horizontal_resolution(), 3000.0);
    assert!(resolution.default_display_resolution_box().is_none());
}

#[test]
fn test_reserved_colour_method_is_kept_but_ignored() {
    let mut header = HeaderSuperBox::new(ImageHeaderBox::new(
        8,
        8,
        3,
        Some(BitDepth::Unsigned { value: 8 }),
    ));
    header
        .colour_specification_boxes
        .push(ColourSpecificationBox::new_icc_profile(
            ColourSpecificationMethods::Reserved { value: 9 },
            vec![0; 6],
        ));
    let mut file = JP2File::new(FileTypeBox::new(BRAND_JP2, vec![BRAND_JP2]), header);
    file.push_contiguous_codestream_box(ContiguousCodestreamBox::new(codestream(8, 8, 3)));
    let data = encode(&file);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    let colour = &boxes.header_box().as_ref().unwrap().colour_specification_boxes[0];
    assert_eq!(
        colour.method(),
        ColourSpecificationMethods::Reserved { value: 9 }
    );
    assert!(colour.icc_profile().is_none());
    assert!(colour.enumerated_colour_space().is_none());
}

#[test]
fn test_unknown_box_skipped() {
    let stream = codestream(64, 128, 3);
    let mut data = encode(&srgb_file(stream.clone()));
    // Move the codestream box behind a box of unknown type
    let codestream_start = 77;
    let tail = data.split_off(codestream_start);
    encode_box_header(&mut data, *b"free", 3).unwrap();
    data.extend_from_slice(&[0, 0, 0]);
    data.extend_from_slice(&tail);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    assert_eq!(
        boxes.contiguous_codestreams_boxes()[0].offset(),
        85 + 11
    );
}

#[test]
fn test_codestream_to_end_of_file() {
    let stream = codestream(64, 128, 3);
    let mut data = encode(&srgb_file(stream.clone()));
    // LBox of 0 means the box extends to the end of the file
    data[77..81].copy_from_slice(&[0, 0, 0, 0]);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    let codestream_box = &boxes.contiguous_codestreams_boxes()[0];
    assert_eq!(codestream_box.length(), stream.len() as u64);
    assert_eq!(boxes.length(), data.len() as u64);
}

#[test]
fn test_extended_length() {
    let stream = codestream(64, 128, 3);
    let mut data = encode(&srgb_file(stream.clone()));
    let tail = data.split_off(77 + 8);
    data.truncate(77);
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&BOX_TYPE_CONTIGUOUS_CODESTREAM);
    data.extend_from_slice(&(tail.len() as u64 + 16).to_be_bytes());
    data.extend_from_slice(&tail);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    let codestream_box = &boxes.contiguous_codestreams_boxes()[0];
    assert_eq!(codestream_box.offset(), 77 + 16);
    assert_eq!(codestream_box.length(), stream.len() as u64);
}

#[test]
fn test_reserved_box_length() {
    let mut data = encode(&srgb_file(codestream(64, 128, 3)));
    data[77..81].copy_from_slice(&[0, 0, 0, 5]);
    assert!(matches!(
        decode_jp2(&mut Cursor::new(&data)),
        Err(JP2Error::BoxLengthReserved {
            length: 5,
            offset: 77
        })
    ));
}

#[test]
fn test_box_overruns_file() {
    let mut data = encode(&srgb_file(codestream(64, 128, 3)));
    data.truncate(data.len() - 4);
    assert!(matches!(
        decode_jp2(&mut Cursor::new(&data)),
        Err(JP2Error::BoxMalformed { .. })
    ));
}

#[test]
fn test_extended_length_past_end_of_file() {
    let mut data = encode(&srgb_file(codestream(64, 128, 3)));
    let start = data.len() as u64;
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"xml ");
    data.extend_from_slice(&[0xFF; 8]);
    match decode_jp2(&mut Cursor::new(&data)) {
        Err(JP2Error::BoxMalformed { box_type, offset }) => {
            assert_eq!(&box_type, b"xml ");
            assert_eq!(offset, start + 16);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_short_uuid_box_skipped() {
    let stream = codestream(64, 128, 3);
    let mut data = encode(&srgb_file(stream.clone()));
    encode_box_header(&mut data, *b"uuid", 8).unwrap();
    data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

    let boxes = decode_jp2(&mut Cursor::new(&data)).unwrap();
    assert!(boxes.uuid_boxes().is_empty());
    assert_eq!(
        boxes.contiguous_codestreams_boxes()[0].length(),
        stream.len() as u64
    );
    assert_eq!(boxes.length(), data.len() as u64);
}

#[test]
fn test_invalid_signature() {
    let mut data = encode(&srgb_file(codestream(64, 128, 3)));
    data[11] = 0x0B;
    assert!(matches!(
        decode_jp2(&mut Cursor::new(&data)),
        Err(JP2Error::InvalidSignature { offset: 8, .. })
    ));
}

#[test]
fn test_invalid_brand() {
    let mut file = srgb_file(codestream(64, 128, 3));
    let data = {
        let mut data = encode(&file);
        data[20..24].copy_from_slice(b"mjp2");
        data
    };
    assert!(matches!(
        decode_jp2(&mut Cursor::new(&data)),
        Err(JP2Error::InvalidBrand { .. })
    ));

    file = JP2File::new(
        FileTypeBox::new(BRAND_JPX, vec![*b"jpxb"]),
        HeaderSuperBox::new(ImageHeaderBox::new(1, 1, 1, None)),
    );
    file.push_contiguous_codestream_box(ContiguousCodestreamBox::new(codestream(1, 1, 1)));
    let data = encode(&file);
    assert!(matches!(
        decode_jp2(&mut Cursor::new(&data)),
        Err(JP2Error::NotCompatible { .. })
    ));
}

#[test]
fn test_missing_codestream() {
    let mut data = encode(&srgb_file(codestream(64, 128, 3)));
    data.truncate(77);
    match decode_jp2(&mut Cursor::new(&data)) {
        Err(JP2Error::BoxMissing { box_type }) => {
            assert_eq!(box_type, BOX_TYPE_CONTIGUOUS_CODESTREAM)
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_codestream_before_header() {
    let stream = codestream(64, 128, 3);
    let mut data = encode(&srgb_file(stream.clone()));
    let codestream_box = data.split_off(77);
    let header_box = data.split_off(32);
    data.extend_from_slice(&codestream_box);
    data.extend_from_slice(&header_box);
    assert!(matches!(
        decode_jp2(&mut Cursor::new(&data)),
        Err(JP2Error::BoxUnexpected { .. })
    ));
}

#[test]
fn test_duplicate_header() {
    let mut data = encode(&srgb_file(codestream(64, 128, 3)));
    let header_box = data[32..77].to_vec();
    let tail = data.split_off(77);
    data.extend_from_slice(&header_box);
    data.extend_from_slice(&tail);
    match decode_jp2(&mut Cursor::new(&data)) {
        Err(JP2Error::BoxDuplicate { box_type, offset }) => {
            assert_eq!(box_type, BOX_TYPE_HEADER);
            assert_eq!(offset, 77 + 8);
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}
