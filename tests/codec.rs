use bytes::BytesMut;
use tokio_util::codec::Decoder;
use wirebus::{
    Error, Event, EventCodec, Feedback, Options, Uid,
    codec::{self, CHECKSUM_LEN, FOOTER_LEN, HEADER_LEN},
};

fn sample() -> Event {
    Event::new(Uid::new(12))
        .with_feedback(Feedback::Ok)
        .with_options(Options::BROADCAST)
        .with_property("entity", 42)
        .with_property("name", "north gate")
        .with_property("empty", "")
}

#[test]
fn test_round_trip() {
    for event in [
        sample(),
        Event::new(Uid::new(1)),
        Event::new(Uid::new(255)).with_payload(&b"\x00\x1e\x1f\r\n\r\n\xff"[..]),
    ] {
        let wire = codec::encode(&event).unwrap();
        let (decoded, consumed) = codec::decode(&wire).unwrap().unwrap();
        assert_eq!(decoded, event);
        assert_eq!(consumed, wire.len());
        assert_eq!(decoded.rawsize(), wire.len());
    }
}

#[test]
fn test_every_body_byte_is_covered_by_checksum() {
    let wire = codec::encode(&sample()).unwrap();
    let body_end = wire.len() - CHECKSUM_LEN - FOOTER_LEN;
    assert!(body_end > HEADER_LEN);

    for i in HEADER_LEN..body_end {
        let mut corrupt = wire.to_vec();
        corrupt[i] ^= 0xff;
        let err = codec::decode(&corrupt).unwrap_err();
        assert!(
            matches!(err, Error::IntegrityViolation { .. }),
            "byte {i}: unexpected {err:?}"
        );
    }
}

#[test]
fn test_concatenated_frames() {
    let first = Event::new(Uid::new(3)).with_property("a", 1);
    let second = Event::new(Uid::new(4)).with_property("b", 2);

    let mut wire = codec::encode(&first).unwrap().to_vec();
    let first_len = wire.len();
    wire.extend_from_slice(&codec::encode(&second).unwrap());

    let (a, used) = codec::decode(&wire).unwrap().unwrap();
    assert_eq!(a, first);
    assert_eq!(used, first_len);
    let (b, used) = codec::decode(&wire[first_len..]).unwrap().unwrap();
    assert_eq!(b, second);
    assert_eq!(first_len + used, wire.len());
}

#[test]
fn test_unterminated_frame_is_incomplete() {
    let wire = codec::encode(&sample()).unwrap();
    let cut = &wire[..wire.len() - 1];
    assert!(codec::decode(cut).unwrap().is_none());

    let mut buf = BytesMut::from(cut);
    let mut codec = EventCodec::default();
    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert_eq!(buf.len(), cut.len());

    buf.extend_from_slice(&wire[wire.len() - 1..]);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(sample()));
    assert!(buf.is_empty());
}

#[test]
fn test_frame_limit_applies_to_both_directions() {
    let small = EventCodec::new(8);
    let event = Event::new(Uid::new(1)).with_property("long key", "long value");
    let mut buf = BytesMut::new();
    assert!(matches!(
        small.encode_frame(&event, &mut buf),
        Err(Error::FrameTooLarge { max: 8, .. })
    ));

    let wire = codec::encode(&event).unwrap();
    // the header alone is enough to refuse it
    assert!(matches!(
        small.decode_frame(&wire[..HEADER_LEN]),
        Err(Error::FrameTooLarge { .. })
    ));
}

#[cfg(feature = "compression")]
#[test]
fn test_compressed_round_trip() {
    use wirebus::Deflate;

    let codec = EventCodec::default().with_compressor(Deflate::default());
    let mut event = Event::new(Uid::new(9)).with_options(Options::COMPRESSED);
    for i in 0..64 {
        event.set_property(format!("key{i}"), "the same value over and over");
    }

    let mut buf = BytesMut::new();
    codec.encode_frame(&event, &mut buf).unwrap();
    let (decoded, used) = codec.decode_frame(&buf).unwrap().unwrap();
    assert_eq!(decoded, event);
    assert_eq!(used, buf.len());
    assert!((decoded.length() as usize) < decoded.properties().len() * 30);
}
