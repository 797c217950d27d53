/*
 * Copyright 2022 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fmt::Debug;
use std::mem;

use spectral::{AssertionFailure, Spec};

use omni_vfs::ErrorCode;

/// An assertion which checks if an `omni_vfs::Result` has the correct error.
pub trait ErrorVariantAssertions {
    /// Assert that the subject is an `Err` of the same variant as
    /// `expected_value`, ignoring the variant's fields.
    fn is_err_variant(&self, expected_value: omni_vfs::Error);

    /// Assert that the subject is an `Err(Error::FileSystem)` carrying
    /// `expected_code`.
    fn is_err_code(&self, expected_code: ErrorCode);
}

impl<'a, T> ErrorVariantAssertions for Spec<'a, omni_vfs::Result<T>>
where
    T: Debug,
{
    fn is_err_variant(&self, expected_value: omni_vfs::Error) {
        match self.subject {
            Ok(ref value) => {
                AssertionFailure::from_spec(self)
                    .with_expected(format!("Err({:?})", expected_value))
                    .with_actual(format!("Ok({:?})", value))
                    .fail();
            }

            Err(ref error) => {
                if mem::discriminant(error) != mem::discriminant(&expected_value) {
                    AssertionFailure::from_spec(self)
                        .with_expected(format!("Err({:?})", &expected_value))
                        .with_actual(format!("Err({:?})", error))
                        .fail();
                }
            }
        }
    }

    fn is_err_code(&self, expected_code: ErrorCode) {
        match self.subject {
            Ok(ref value) => {
                AssertionFailure::from_spec(self)
                    .with_expected(format!("Err(FileSystem {{ code: {:?}, .. }})", expected_code))
                    .with_actual(format!("Ok({:?})", value))
                    .fail();
            }

            Err(omni_vfs::Error::FileSystem { ref code, .. }) if *code == expected_code => {}

            Err(ref error) => {
                AssertionFailure::from_spec(self)
                    .with_expected(format!("Err(FileSystem {{ code: {:?}, .. }})", expected_code))
                    .with_actual(format!("Err({:?})", error))
                    .fail();
            }
        }
    }
}
