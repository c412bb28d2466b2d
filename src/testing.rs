use std::any::type_name;
use std::fmt::Debug;
use std::io;

use codeq::Codec;

use crate::Batch;

/// Build a batch that carries one record per payload.
#[allow(dead_code)]
pub(crate) fn batch_of(payloads: &[&str]) -> Batch {
    let mut b = Batch::new();
    for p in payloads {
        b.push(p.as_bytes());
    }
    b
}

/// A 10 bytes payload, distinct for every `i` below 10^7.
#[allow(dead_code)]
pub(crate) fn payload10(i: u64) -> String {
    format!("pay-{:06}", i)
}

#[allow(dead_code)]
pub fn test_codec_without_corruption<D: Codec + PartialEq + Debug>(
    encoded_bytes: &[u8],
    v: &D,
) -> Result<(), io::Error> {
    let mes = format!("Type: {} encoded data: {:?}", type_name::<D>(), encoded_bytes);

    // Test encoding
    {
        let mut b = Vec::new();
        let n = v.encode(&mut b)?;
        assert_eq!(n, b.len(), "output len, {}", &mes);
        assert_eq!(b, encoded_bytes, "output data, {}", &mes);
    }

    // Test decoding
    {
        let b = encoded_bytes.to_vec();
        let decoded = D::decode(&mut b.as_slice())?;
        assert_eq!(v, &decoded, "decode, {}", &mes);
    }

    // Every truncated input fails
    for i in 0..encoded_bytes.len() {
        let res = D::decode(&encoded_bytes[..i]);
        assert!(res.is_err(), "decode truncated to {} bytes, {}", i, &mes);
    }

    Ok(())
}
