/// Implement `Encode` / `Decode` for a type that is deliberately left out of save states. Encoding
/// writes nothing and decoding produces `Default::default()`; the real contents are moved over from
/// the running instance after a state is loaded.
macro_rules! impl_skip_serialization {
    ($t:ty) => {
        impl ::bincode::Encode for $t {
            fn encode<E: ::bincode::enc::Encoder>(
                &self,
                _encoder: &mut E,
            ) -> Result<(), ::bincode::error::EncodeError> {
                Ok(())
            }
        }

        impl<Context> ::bincode::Decode<Context> for $t {
            fn decode<D: ::bincode::de::Decoder<Context = Context>>(
                _decoder: &mut D,
            ) -> Result<Self, ::bincode::error::DecodeError> {
                Ok(Self::default())
            }
        }

        impl<'de, Context> ::bincode::BorrowDecode<'de, Context> for $t {
            fn borrow_decode<D: ::bincode::de::BorrowDecoder<'de, Context = Context>>(
                _decoder: &mut D,
            ) -> Result<Self, ::bincode::error::DecodeError> {
                Ok(Self::default())
            }
        }
    };
}

pub(crate) use impl_skip_serialization;
