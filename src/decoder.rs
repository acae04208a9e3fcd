// ===============================
// src/decoder.rs
// ===============================
//
// Account layouts (Anchor, 8-byte header):
// - limit order : 372 bytes, expiredAt is Option<i64> (1 or 9 bytes) so every
//                 field after it moves; offsets always come from the cursor.
// - DCA         : 289 bytes, fixed widths.
//
// Both layouts keep inputMint at 40 and outputMint at 72, which is what the
// RPC memcmp filters rely on.
//

use tracing::warn;

use crate::domain::{DecodedDcaAccount, DecodedLimitOrder, RawAccount};
use crate::metrics::DECODE_FAILURES;
use crate::reader::{ByteReader, DecodeError, PUBKEY_LEN};

pub const ACCOUNT_HEADER_LEN: usize = 8;
pub const LIMIT_ORDER_SIZE: usize = 372;
pub const DCA_ACCOUNT_SIZE: usize = 289;

// memcmp filter offsets (shared by both layouts)
pub const INPUT_MINT_OFFSET: usize = ACCOUNT_HEADER_LEN + PUBKEY_LEN;
pub const OUTPUT_MINT_OFFSET: usize = INPUT_MINT_OFFSET + PUBKEY_LEN;

fn expect_len(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() != expected {
        return Err(DecodeError::BadLength { expected, actual: data.len() });
    }
    Ok(())
}

fn mint(rd: &mut ByteReader<'_>, field: &'static str) -> Result<String, DecodeError> {
    let bytes = rd.pubkey_bytes()?;
    let value = bs58::encode(bytes).into_string();
    if bytes == [0u8; PUBKEY_LEN] {
        return Err(DecodeError::BadAddress { field, value });
    }
    Ok(value)
}

fn distinct_mints(input: &str, output: &str) -> Result<(), DecodeError> {
    if input == output {
        return Err(DecodeError::BadAddress { field: "outputMint", value: output.to_string() });
    }
    Ok(())
}

pub fn decode_limit_order(address: &str, data: &[u8]) -> Result<DecodedLimitOrder, DecodeError> {
    expect_len(data, LIMIT_ORDER_SIZE)?;
    let mut rd = ByteReader::new(data);
    rd.skip(ACCOUNT_HEADER_LEN)?;

    let maker = rd.pubkey()?;
    let input_mint = mint(&mut rd, "inputMint")?;
    let output_mint = mint(&mut rd, "outputMint")?;
    distinct_mints(&input_mint, &output_mint)?;

    Ok(DecodedLimitOrder {
        address: address.to_string(),
        maker,
        input_mint,
        output_mint,
        input_token_program: rd.pubkey()?,
        output_token_program: rd.pubkey()?,
        input_mint_reserve: rd.pubkey()?,
        unique_id: rd.u64()?,
        ori_making_amount: rd.u64()?,
        ori_taking_amount: rd.u64()?,
        making_amount: rd.u64()?,
        taking_amount: rd.u64()?,
        borrow_making_amount: rd.u64()?,
        expired_at: rd.option_i64()?,
        fee_bps: rd.u16()?,
        fee_account: rd.pubkey()?,
        created_at: rd.i64()?,
        updated_at: rd.i64()?,
        bump: rd.u8()?,
    })
}

pub fn decode_dca_account(address: &str, data: &[u8]) -> Result<DecodedDcaAccount, DecodeError> {
    expect_len(data, DCA_ACCOUNT_SIZE)?;
    let mut rd = ByteReader::new(data);
    rd.skip(ACCOUNT_HEADER_LEN)?;

    let user = rd.pubkey()?;
    let input_mint = mint(&mut rd, "inputMint")?;
    let output_mint = mint(&mut rd, "outputMint")?;
    distinct_mints(&input_mint, &output_mint)?;

    // 0 on-chain means "no bound"
    let bound = |v: u64| (v > 0).then_some(v);

    Ok(DecodedDcaAccount {
        address: address.to_string(),
        user,
        input_mint,
        output_mint,
        idx: rd.u64()?,
        next_cycle_at: rd.i64()?,
        in_deposited: rd.u64()?,
        in_withdrawn: rd.u64()?,
        out_withdrawn: rd.u64()?,
        in_used: rd.u64()?,
        out_received: rd.u64()?,
        in_amount_per_cycle: rd.u64()?,
        cycle_frequency: rd.i64()?,
        next_cycle_amount_left: rd.u64()?,
        in_account: rd.pubkey()?,
        out_account: rd.pubkey()?,
        min_out_amount: bound(rd.u64()?),
        max_out_amount: bound(rd.u64()?),
        keeper_in_balance_before_borrow: rd.u64()?,
        dca_out_balance_before_swap: rd.u64()?,
        created_at: rd.i64()?,
        bump: rd.u8()?,
    })
}

/// Decode a batch; bad records are logged and skipped, never fatal.
pub fn decode_all<T>(
    accounts: &[RawAccount],
    kind: &'static str,
    decode: impl Fn(&str, &[u8]) -> Result<T, DecodeError>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(accounts.len());
    for acc in accounts {
        match decode(&acc.address, &acc.data) {
            Ok(v) => out.push(v),
            Err(e) => {
                warn!(address = %acc.address, kind, error = %e, "skipping undecodable account");
                DECODE_FAILURES.with_label_values(&[kind, e.kind()]).inc();
            }
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::reader::{read_field, FieldKind, FieldValue};

    // fixed prefix: header + 6 keys + 6 u64
    const EXPIRY_OFFSET: usize = ACCOUNT_HEADER_LEN + 6 * PUBKEY_LEN + 6 * 8;

    #[test]
    fn limit_order_without_expiry_round_trips() {
        let fx = LimitFixture::default();
        let o = decode_limit_order("Order1", &fx.encode()).unwrap();
        assert_eq!(o.address, "Order1");
        assert_eq!(o.maker, b58(1));
        assert_eq!(o.input_mint, b58(2));
        assert_eq!(o.output_mint, b58(3));
        assert_eq!(o.input_token_program, b58(4));
        assert_eq!(o.output_token_program, b58(5));
        assert_eq!(o.input_mint_reserve, b58(6));
        assert_eq!(o.unique_id, 42);
        assert_eq!(o.ori_making_amount, 5_000_000);
        assert_eq!(o.ori_taking_amount, 250_000_000);
        assert_eq!(o.making_amount, 4_000_000);
        assert_eq!(o.taking_amount, 200_000_000);
        assert_eq!(o.borrow_making_amount, 0);
        assert_eq!(o.expired_at, None);
        assert_eq!(o.fee_bps, 10);
        assert_eq!(o.fee_account, b58(7));
        assert_eq!(o.created_at, 1_736_046_245);
        assert_eq!(o.updated_at, 1_736_050_000);
        assert_eq!(o.bump, 254);
    }

    #[test]
    fn limit_order_with_expiry_round_trips() {
        let fx = LimitFixture { expired_at: Some(1_740_000_000), fee_bps: 25, bump: 7, ..Default::default() };
        let o = decode_limit_order("Order2", &fx.encode()).unwrap();
        assert_eq!(o.expired_at, Some(1_740_000_000));
        assert_eq!(o.fee_bps, 25);
        assert_eq!(o.fee_account, b58(7));
        assert_eq!(o.created_at, fx.created_at);
        assert_eq!(o.updated_at, fx.updated_at);
        assert_eq!(o.bump, 7);
    }

    #[test]
    fn fields_after_expiry_shift_by_eight() {
        let absent = LimitFixture { fee_bps: 0xBEEF, ..Default::default() }.encode();
        let present = LimitFixture { fee_bps: 0xBEEF, expired_at: Some(1), ..Default::default() }.encode();

        assert_eq!(absent[EXPIRY_OFFSET], 0);
        assert_eq!(present[EXPIRY_OFFSET], 1);

        // feeBps sits 1 byte after the expiry offset when absent, 9 when present
        let (fee, _) = read_field(&absent, EXPIRY_OFFSET + 1, FieldKind::U16).unwrap();
        assert_eq!(fee, FieldValue::U16(0xBEEF));
        let (fee, _) = read_field(&present, EXPIRY_OFFSET + 9, FieldKind::U16).unwrap();
        assert_eq!(fee, FieldValue::U16(0xBEEF));

        // the bump byte moves by exactly 8
        let bump_absent = EXPIRY_OFFSET + 1 + 2 + 32 + 8 + 8;
        assert_eq!(absent[bump_absent], 254);
        assert_eq!(present[bump_absent + 8], 254);
    }

    #[test]
    fn filter_offsets_match_layout() {
        let data = LimitFixture::default().encode();
        assert_eq!(&data[INPUT_MINT_OFFSET..INPUT_MINT_OFFSET + 32], &key(2));
        assert_eq!(&data[OUTPUT_MINT_OFFSET..OUTPUT_MINT_OFFSET + 32], &key(3));
        let dca = DcaFixture::default().encode();
        assert_eq!(&dca[INPUT_MINT_OFFSET..INPUT_MINT_OFFSET + 32], &key(2));
        assert_eq!(&dca[OUTPUT_MINT_OFFSET..OUTPUT_MINT_OFFSET + 32], &key(3));
    }

    #[test]
    fn wrong_length_is_malformed() {
        let mut data = LimitFixture::default().encode();
        data.pop();
        assert_eq!(
            decode_limit_order("x", &data).unwrap_err(),
            DecodeError::BadLength { expected: LIMIT_ORDER_SIZE, actual: LIMIT_ORDER_SIZE - 1 }
        );
    }

    #[test]
    fn bad_expiry_discriminator_is_malformed() {
        let mut data = LimitFixture::default().encode();
        data[EXPIRY_OFFSET] = 3;
        assert_eq!(
            decode_limit_order("x", &data).unwrap_err(),
            DecodeError::BadDiscriminator { offset: EXPIRY_OFFSET, value: 3 }
        );
    }

    #[test]
    fn zero_or_identical_mints_are_malformed() {
        let zero = LimitFixture { input_mint: [0; 32], ..Default::default() }.encode();
        assert_eq!(decode_limit_order("x", &zero).unwrap_err().kind(), "address");

        let same = LimitFixture { output_mint: key(2), ..Default::default() }.encode();
        assert_eq!(decode_limit_order("x", &same).unwrap_err().kind(), "address");
    }

    #[test]
    fn dca_account_round_trips() {
        let fx = DcaFixture { min_out_amount: 0, max_out_amount: 600_000_000, in_withdrawn: 5, ..Default::default() };
        let data = fx.encode();
        assert_eq!(data.len(), DCA_ACCOUNT_SIZE);

        let d = decode_dca_account("Dca1", &data).unwrap();
        assert_eq!(d.user, b58(1));
        assert_eq!(d.input_mint, b58(2));
        assert_eq!(d.output_mint, b58(3));
        assert_eq!(d.idx, 7);
        assert_eq!(d.next_cycle_at, 1_736_046_245);
        assert_eq!(d.in_deposited, 300_000_000);
        assert_eq!(d.in_withdrawn, 5);
        assert_eq!(d.in_used, 120_000_000);
        assert_eq!(d.in_amount_per_cycle, 10_000_000);
        assert_eq!(d.cycle_frequency, 3600);
        assert_eq!(d.in_account, b58(8));
        assert_eq!(d.out_account, b58(9));
        assert_eq!(d.min_out_amount, None);
        assert_eq!(d.max_out_amount, Some(600_000_000));
        assert_eq!(d.created_at, 1_700_000_000);
        assert_eq!(d.bump, 253);
    }

    #[test]
    fn batch_decode_skips_bad_records() {
        let good = LimitFixture::default().encode();
        let accounts = vec![
            RawAccount { address: "a".into(), data: good.clone() },
            RawAccount { address: "b".into(), data: good[..100].to_vec() },
            RawAccount { address: "c".into(), data: good },
        ];
        let decoded = decode_all(&accounts, "limit", decode_limit_order);
        let ids: Vec<_> = decoded.iter().map(|o| o.address.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
