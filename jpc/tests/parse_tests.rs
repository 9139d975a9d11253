use std::io::Cursor;

use jpc::{
    decode_jpc, insert_comment, CodestreamError, CodingStyleMarkerSegment, CommentMarkerSegment,
    CommentRegistrationValue, ComponentSize, ImageAndTileSizeMarkerSegment, ProgressionOrder,
    TransformationFilter, MARKER_SYMBOL_EOC, MARKER_SYMBOL_QCD, MARKER_SYMBOL_SOC,
    MARKER_SYMBOL_SOT,
};

fn blue_codestream(comments: &[CommentMarkerSegment]) -> Vec<u8> {
    let mut codestream = MARKER_SYMBOL_SOC.to_vec();
    ImageAndTileSizeMarkerSegment::new(128, 64, &[ComponentSize::new(8, false); 3])
        .encode(&mut codestream)
        .unwrap();
    CodingStyleMarkerSegment::new(
        ProgressionOrder::RLPCLP,
        8,
        true,
        5,
        (6, 6),
        TransformationFilter::Reversible,
        &[(8, 8)],
        true,
    )
    .encode(&mut codestream)
    .unwrap();
    // QCD, no quantization, guard bits 2, one exponent per sub-band
    codestream.extend_from_slice(&MARKER_SYMBOL_QCD);
    codestream.extend_from_slice(&[0, 19, 0x40]);
    codestream.extend_from_slice(&[0x48; 16]);
    for comment in comments {
        comment.encode(&mut codestream).unwrap();
    }
    codestream.extend_from_slice(&MARKER_SYMBOL_SOT);
    codestream.extend_from_slice(&[0, 10, 0, 0, 0, 0, 0, 14, 0, 1]);
    codestream.extend_from_slice(&[255, 147]);
    codestream.extend_from_slice(&MARKER_SYMBOL_EOC);
    codestream
}

#[test]
fn test_blue() {
    let data = blue_codestream(&[]);
    let mut reader = Cursor::new(&data);
    let result = decode_jpc(&mut reader);
    assert!(result.is_ok());
    let codestream = result.unwrap();
    assert_eq!(codestream.offset(), 0);
    assert_eq!(codestream.header_length(), 2 + 49 + 20 + 21);

    let header = codestream.header();

    let siz = header.image_and_tile_size_marker_segment();
    assert_eq!(siz.reference_grid_width(), 128);
    assert_eq!(siz.reference_grid_height(), 64);
    assert_eq!(siz.width(), 128);
    assert_eq!(siz.height(), 64);
    assert_eq!(siz.image_horizontal_offset(), 0);
    assert_eq!(siz.image_vertical_offset(), 0);
    assert_eq!(siz.offset(), 4);
    assert_eq!(siz.length(), 47);
    assert_eq!(siz.decoder_capabilities(), 0);
    assert_eq!(siz.reference_tile_width(), 128);
    assert_eq!(siz.reference_tile_height(), 64);
    assert_eq!(siz.no_components(), 3);
    for i in 0..3 {
        assert_eq!(siz.precision(i).unwrap(), 8);
        assert_eq!(siz.values_are_signed(i).unwrap(), false);
        assert_eq!(siz.horizontal_separation(i).unwrap(), 1);
        assert_eq!(siz.vertical_separation(i).unwrap(), 1);
    }
    assert!(matches!(
        siz.precision(3),
        Err(CodestreamError::ComponentIndex { index: 3, .. })
    ));

    // COD
    let cod = header.coding_style_marker_segment().unwrap();
    assert_eq!(cod.length(), 18);
    assert!(cod.has_defined_precinct_size());
    assert!(cod.uses_sop());
    assert!(!cod.uses_eph());
    assert_eq!(cod.progression_order(), ProgressionOrder::RLPCLP);
    assert_eq!(cod.no_layers(), 8);
    assert!(cod.multiple_component_transformation());

    let parameters = cod.coding_style_parameters();
    assert_eq!(parameters.no_decomposition_levels(), 5);
    assert_eq!(parameters.code_block_width(), 64);
    assert_eq!(parameters.code_block_height(), 64);
    assert_eq!(parameters.transformation(), TransformationFilter::Reversible);
    let precincts = parameters.precinct_sizes();
    assert_eq!(precincts.len(), 6);
    assert_eq!(precincts[0].width_exponent(), 8);
    assert_eq!(precincts[5].height_exponent(), 8);

    assert_eq!(header.skipped_marker_segments(), &vec![MARKER_SYMBOL_QCD]);
    assert!(header.comment_marker_segments().is_empty());
}

#[test]
fn test_comments() {
    let data = blue_codestream(&[
        CommentMarkerSegment::new(CommentRegistrationValue::Latin, b"Kakadu-v8.0"),
        CommentMarkerSegment::new(CommentRegistrationValue::Binary, &[0, 1, 2]),
    ]);
    let codestream = decode_jpc(&mut Cursor::new(&data)).unwrap();
    let comments = codestream.header().comment_marker_segments();
    assert_eq!(comments.len(), 2);
    assert_eq!(
        comments[0].registration_value(),
        CommentRegistrationValue::Latin
    );
    assert_eq!(comments[0].comment_utf8().unwrap(), "Kakadu-v8.0");
    assert_eq!(
        comments[1].registration_value(),
        CommentRegistrationValue::Binary
    );
    assert_eq!(comments[1].comment(), &[0, 1, 2]);
}

#[test]
fn test_insert_comment_after_siz() {
    let data = blue_codestream(&[]);
    let comment = CommentMarkerSegment::new(CommentRegistrationValue::Latin, b"SIPI:record");
    let spliced = insert_comment(&data, &comment).unwrap();
    assert_eq!(spliced.len(), data.len() + 2 + 2 + 2 + 11);
    // SOC + SIZ are untouched, COM follows directly
    assert_eq!(&spliced[..51], &data[..51]);
    assert_eq!(&spliced[51..53], &[255, 100]);

    let codestream = decode_jpc(&mut Cursor::new(&spliced)).unwrap();
    let comments = codestream.header().comment_marker_segments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].comment_utf8().unwrap(), "SIPI:record");
    assert_eq!(
        codestream
            .header()
            .coding_style_marker_segment()
            .unwrap()
            .no_layers(),
        8
    );
}

#[test]
fn test_insert_comment_requires_soc() {
    let comment = CommentMarkerSegment::new(CommentRegistrationValue::Latin, b"x");
    assert!(matches!(
        insert_comment(&[0, 0, 0, 0, 0, 0], &comment),
        Err(CodestreamError::MarkerMissing { .. })
    ));
}

#[test]
fn test_decode_at_offset() {
    let mut data = vec![0xAA; 10];
    data.extend_from_slice(&blue_codestream(&[]));
    let mut reader = Cursor::new(&data);
    reader.set_position(10);
    let codestream = decode_jpc(&mut reader).unwrap();
    assert_eq!(codestream.offset(), 10);
    assert_eq!(codestream.header().image_and_tile_size_marker_segment().offset(), 14);
}

#[test]
fn test_missing_soc() {
    let mut data = blue_codestream(&[]);
    data[1] = 0x50;
    assert!(matches!(
        decode_jpc(&mut Cursor::new(&data)),
        Err(CodestreamError::MarkerUnexpected { offset: 0, .. })
    ));
}

#[test]
fn test_truncated_main_header() {
    let data = blue_codestream(&[]);
    assert!(matches!(
        decode_jpc(&mut Cursor::new(&data[..60])),
        Err(CodestreamError::MarkerMissing { .. }) | Err(CodestreamError::Io(_))
    ));
}

#[test]
fn test_siz_length_mismatch() {
    let mut data = blue_codestream(&[]);
    // Lsiz claims 4 components while Csiz says 3
    data[5] = 50;
    assert!(matches!(
        decode_jpc(&mut Cursor::new(&data)),
        Err(CodestreamError::MarkerError { .. })
    ));
}

#[test]
fn test_siz_component_count_overflow() {
    let mut data = blue_codestream(&[]);
    // Csiz of 65535 components
    data[40..42].copy_from_slice(&[0xFF, 0xFF]);
    assert!(matches!(
        decode_jpc(&mut Cursor::new(&data)),
        Err(CodestreamError::MarkerError { .. })
    ));
}

#[test]
fn test_largest_code_block_exponent() {
    let mut data = blue_codestream(&[]);
    // xcb offset of 15 in SPcod
    data[61] = 0x0F;
    let codestream = decode_jpc(&mut Cursor::new(&data)).unwrap();
    let parameters = codestream
        .header()
        .coding_style_marker_segment()
        .unwrap()
        .coding_style_parameters();
    assert_eq!(parameters.code_block_width(), 1 << 17);
    assert_eq!(parameters.code_block_height(), 64);
}
